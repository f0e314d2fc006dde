//! Economic activity by emission source classification code (SCC).
//!
//! Every SCC used in the SCC map is given a position, in sorted order. The activity attributed to
//! an SCC is the total activity of the industries which emit under it.
use crate::error::EioError;
use crate::sector::Mask;
use crate::spatial_ref::{Scc, normalize_scc};
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Axis};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

/// SCC descriptions keyed by SCC
pub type SccDescriptions = HashMap<Scc, String>;

/// Read a file of SCC descriptions.
///
/// Each record holds an SCC and its description. Lines starting with `#` are ignored, as is
/// anything following a `!` in a description.
pub fn read_scc_descriptions(file_path: &Path) -> Result<SccDescriptions> {
    let file = File::open(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(file);

    let mut descriptions = SccDescriptions::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Could not read {}", file_path.display()))?;
        let code = record.get(0).unwrap_or_default().trim();
        let scc = normalize_scc(code)
            .with_context(|| format!("Reading SCC descriptions from {}", file_path.display()))?;
        let description = record.get(1).unwrap_or_default();
        let description = description.split('!').next().unwrap_or_default().trim();
        descriptions.insert(scc, description.to_string());
    }

    Ok(descriptions)
}

/// The SCCs used by the model, with the industries emitting under each
#[derive(Debug, Clone, PartialEq)]
pub struct SccList {
    sccs: Vec<Scc>,
    index: HashMap<Scc, usize>,
    /// Industry positions for each SCC
    industries: Vec<Vec<usize>>,
    descriptions: SccDescriptions,
}

impl SccList {
    /// Build the list from the SCCs of each industry
    pub fn new(industry_sccs: &[Vec<Scc>], descriptions: SccDescriptions) -> Self {
        let mut by_scc: BTreeMap<&Scc, Vec<usize>> = BTreeMap::new();
        for (industry, sccs) in industry_sccs.iter().enumerate() {
            for scc in sccs {
                let industries = by_scc.entry(scc).or_default();
                if !industries.contains(&industry) {
                    industries.push(industry);
                }
            }
        }

        let (sccs, industries): (Vec<Scc>, Vec<Vec<usize>>) = by_scc
            .into_iter()
            .map(|(scc, industries)| (scc.clone(), industries))
            .unzip();
        let index = sccs
            .iter()
            .enumerate()
            .map(|(i, scc)| (scc.clone(), i))
            .collect();

        Self {
            sccs,
            index,
            industries,
            descriptions,
        }
    }

    /// The SCCs, in sorted order
    pub fn codes(&self) -> &[Scc] {
        &self.sccs
    }

    /// The number of SCCs
    pub fn len(&self) -> usize {
        self.sccs.len()
    }

    /// Whether there are no SCCs
    pub fn is_empty(&self) -> bool {
        self.sccs.is_empty()
    }

    /// The position of `code`
    pub fn index(&self, code: &str) -> Result<usize, EioError> {
        self.index
            .get(code)
            .copied()
            .ok_or_else(|| EioError::not_found("SCC", code))
    }

    /// A mask selecting only `code`
    pub fn mask(&self, code: &str) -> Result<Mask, EioError> {
        Ok(Mask::from_indices(self.len(), [self.index(code)?]))
    }

    /// The positions of the industries emitting under the SCC at position `i`
    pub fn industries(&self, i: usize) -> &[usize] {
        &self.industries[i]
    }

    /// The description of `code`
    pub fn description(&self, code: &str) -> Result<&str, EioError> {
        self.descriptions
            .get(code)
            .map(String::as_str)
            .ok_or_else(|| EioError::not_found("SCC description", code))
    }

    /// Convert an industry x commodity requirements matrix to SCC x commodity.
    ///
    /// Each row is the sum of the rows of the industries emitting under that SCC.
    pub fn requirements(&self, requirements: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.len(), requirements.ncols()));
        for (mut row, industries) in out.axis_iter_mut(Axis(0)).zip(&self.industries) {
            for &industry in industries {
                row += &requirements.row(industry);
            }
        }
        out
    }

    /// Convert a vector of activity by industry to activity by SCC
    pub fn activity(&self, by_industry: &Array1<f64>) -> Array1<f64> {
        self.industries
            .iter()
            .map(|industries| industries.iter().map(|&i| by_industry[i]).sum())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    fn scc_list() -> SccList {
        let industry_sccs: Vec<Vec<Scc>> = vec![
            vec!["2801000003".into(), "2801700090".into()],
            vec!["2801000003".into()],
            vec!["2310000000".into()],
        ];
        let descriptions = [("2801000003".into(), "Fertilizer application".to_string())]
            .into_iter()
            .collect();
        SccList::new(&industry_sccs, descriptions)
    }

    #[test]
    fn test_scc_list_sorted() {
        let sccs = scc_list();
        let codes: Vec<_> = sccs.codes().iter().map(Scc::as_str).collect();
        assert_eq!(codes, ["2310000000", "2801000003", "2801700090"]);
        assert_eq!(sccs.industries(1), [0, 1]);
        assert_eq!(sccs.index("2801700090").unwrap(), 2);
    }

    #[test]
    fn test_mask() {
        let sccs = scc_list();
        assert_eq!(sccs.mask("2801000003").unwrap().values(), &array![0.0, 1.0, 0.0]);
        assert_eq!(
            sccs.mask("1234567890"),
            Err(EioError::not_found("SCC", "1234567890"))
        );
    }

    #[test]
    fn test_description() {
        let sccs = scc_list();
        assert_eq!(
            sccs.description("2801000003").unwrap(),
            "Fertilizer application"
        );
        assert_eq!(
            sccs.description("2310000000"),
            Err(EioError::not_found("SCC description", "2310000000"))
        );
    }

    #[test]
    fn test_requirements() {
        let sccs = scc_list();
        let requirements = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(
            sccs.requirements(&requirements),
            array![[5.0, 6.0], [4.0, 6.0], [1.0, 2.0]]
        );
        assert_eq!(
            sccs.activity(&array![1.0, 10.0, 100.0]),
            array![100.0, 11.0, 1.0]
        );
    }

    #[test]
    fn test_read_scc_descriptions() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sccdesc.csv");
        fs::write(
            &file_path,
            "# SCC descriptions\n\
             2801000003,\"Fertilizer application\"\n\
             30500101,Asphalt roofing ! blowing\n",
        )
        .unwrap();
        let descriptions = read_scc_descriptions(&file_path).unwrap();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions["2801000003"], "Fertilizer application");
        assert_eq!(descriptions["0030500101"], "Asphalt roofing");
    }

    #[test]
    fn test_read_scc_descriptions_bad_code() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sccdesc.csv");
        fs::write(&file_path, "123,Too short\n").unwrap();
        assert_error!(
            read_scc_descriptions(&file_path),
            format!("Reading SCC descriptions from {}", file_path.display())
        );
    }
}
