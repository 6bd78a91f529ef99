#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lineage(Vec<String>);

impl Lineage {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        Self(
            raw.split(';')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    // Stops at the first mismatch; later coincidences are not shared.
    pub fn common_prefix(&self, other: &Lineage) -> Lineage {
        Lineage(
            self.0
                .iter()
                .zip(other.0.iter())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a.clone())
                .collect(),
        )
    }

    pub fn intersect_all<'a, I>(lineages: I) -> Lineage
    where
        I: IntoIterator<Item = &'a Lineage>,
    {
        let mut iter = lineages.into_iter();
        let Some(first) = iter.next() else {
            return Lineage::default();
        };
        let mut common = first.clone();
        for lineage in iter {
            if common.is_empty() {
                break;
            }
            common = common.common_prefix(lineage);
        }
        common
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_drops_empty_tokens() {
        let lineage = Lineage::parse(Some(" Bacteria ; ;Pseudomonadota;  Escherichia ;"));
        assert_eq!(
            lineage.names(),
            &["Bacteria", "Pseudomonadota", "Escherichia"]
        );
    }

    #[test]
    fn missing_lineage_is_empty() {
        assert!(Lineage::parse(None).is_empty());
        assert!(Lineage::parse(Some(" ; ")).is_empty());
    }

    #[test]
    fn prefix_stops_at_first_mismatch() {
        let a = Lineage::parse(Some("Bacteria;Firmicutes;Bacilli;Lactobacillales"));
        let b = Lineage::parse(Some("Bacteria;Bacillota;Bacilli;Lactobacillales"));
        let common = a.common_prefix(&b);
        assert_eq!(common.names(), &["Bacteria"]);
        assert_eq!(common.last(), Some("Bacteria"));
    }

    #[test]
    fn intersect_all_narrows_from_seed() {
        let lineages = [
            Lineage::parse(Some("Bacteria;Pseudomonadota;Gammaproteobacteria;Escherichia;coli")),
            Lineage::parse(Some("Bacteria;Pseudomonadota;Gammaproteobacteria;Escherichia")),
            Lineage::parse(Some("Bacteria;Pseudomonadota;Betaproteobacteria")),
        ];
        let common = Lineage::intersect_all(&lineages);
        assert_eq!(common.names(), &["Bacteria", "Pseudomonadota"]);
    }

    #[test]
    fn intersect_with_empty_lineage_is_empty() {
        let lineages = [
            Lineage::parse(Some("Bacteria;Pseudomonadota")),
            Lineage::parse(None),
        ];
        assert!(Lineage::intersect_all(&lineages).is_empty());
    }
}
