// src/layout/extract.rs

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, instrument, trace, warn};

use super::types::FieldSpec;
use crate::error::LayoutError;

/// `Column: <start>[-<end>]`, then anything, then the first
/// `SAS Variable Name: <name>` after it.
static COLUMN_VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)Column:\s*([0-9]+)(?:-([0-9]+))?.*?SAS\s+Variable\s+Name:\s*([A-Za-z0-9_]+)")
        .expect("column/variable pattern should compile")
});

/// Decode entities and drop markup, leaving the document's text with each
/// text node separated by a space.
pub fn plain_text(raw: &str) -> String {
    let document = Html::parse_document(raw);
    document.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Derive the field layout from a codebook document.
///
/// Returns the specs sorted by `start`; specs with the same start keep the
/// order they appear in the document. Overlapping specs are all kept.
#[instrument(level = "debug", skip(codebook), fields(content_len = codebook.len()))]
pub fn extract(codebook: &str) -> Result<Vec<FieldSpec>, LayoutError> {
    let text = plain_text(codebook);
    trace!(text_len = text.len(), "stripped codebook markup");

    let mut specs = Vec::new();
    for caps in COLUMN_VARIABLE.captures_iter(&text) {
        let var = &caps[3];
        let start: usize = match caps[1].parse() {
            Ok(v) => v,
            Err(e) => {
                warn!(var, raw = &caps[1], "unparsable column start: {}", e);
                continue;
            }
        };
        let end: usize = match caps.get(2).map(|m| m.as_str().parse()) {
            None => start,
            Some(Ok(v)) => v,
            Some(Err(e)) => {
                warn!(var, raw = &caps[2], "unparsable column end: {}", e);
                continue;
            }
        };
        if start == 0 || end < start {
            warn!(var, start, end, "skipping invalid column range");
            continue;
        }
        trace!(var, start, end, "matched field");
        specs.push(FieldSpec::new(var, start, end));
    }

    if specs.is_empty() {
        return Err(LayoutError::NoFields);
    }

    // stable: ties stay in scan order
    specs.sort_by_key(|s| s.start);
    debug!(fields = specs.len(), "extracted layout");
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODEBOOK: &str = r#"
<html><body>
<table class="table">
  <tr><td>Label: Interview Date</td></tr>
  <tr><td>Section Name: Record Identification</td>
      <td>Column: 19-26</td></tr>
  <tr><td>Type of Variable: Num</td>
      <td>SAS&nbsp;Variable Name: IDATE</td></tr>
</table>
<table class="table">
  <tr><td>Column: 1-2</td><td>Question: State FIPS &amp; territory</td></tr>
  <tr><td>SAS Variable Name: _STATE</td></tr>
</table>
<table class="table">
  <tr><td>Column: 19-20</td></tr>
  <tr><td>SAS Variable Name: IMONTH</td></tr>
</table>
<table class="table">
  <tr><td>Column: 63</td></tr>
  <tr><td>SAS Variable Name: DISPCODE</td></tr>
</table>
</body></html>"#;

    #[test]
    fn extracts_sorted_by_start_with_ties_in_scan_order() -> anyhow::Result<()> {
        let specs = extract(CODEBOOK)?;
        assert_eq!(
            specs,
            vec![
                FieldSpec::new("_STATE", 1, 2),
                FieldSpec::new("IDATE", 19, 26),
                FieldSpec::new("IMONTH", 19, 20),
                FieldSpec::new("DISPCODE", 63, 63),
            ]
        );
        assert!(specs.iter().all(|s| s.end >= s.start));
        Ok(())
    }

    #[test]
    fn overlapping_ranges_are_kept() -> anyhow::Result<()> {
        let specs = extract(CODEBOOK)?;
        let idate = specs.iter().find(|s| s.name == "IDATE").unwrap();
        let imonth = specs.iter().find(|s| s.name == "IMONTH").unwrap();
        assert!(idate.overlaps(imonth));
        Ok(())
    }

    #[test]
    fn halves_may_be_separated_by_unrelated_text() -> anyhow::Result<()> {
        let text = "...Column: 1-3 ... some description\n\nmore\n... SAS Variable Name: AAA ... \
                    Column: 4-4 ... SAS Variable Name: BBB...";
        let specs = extract(text)?;
        assert_eq!(
            specs,
            vec![FieldSpec::new("AAA", 1, 3), FieldSpec::new("BBB", 4, 4)]
        );
        Ok(())
    }

    #[test]
    fn no_matches_is_an_error() {
        let err = extract("<html><body>nothing to see</body></html>").unwrap_err();
        assert!(matches!(err, LayoutError::NoFields));
    }

    #[test]
    fn inverted_range_is_skipped() -> anyhow::Result<()> {
        let text = "Column: 9-3 SAS Variable Name: BAD Column: 5 SAS Variable Name: OK";
        let specs = extract(text)?;
        assert_eq!(specs, vec![FieldSpec::new("OK", 5, 5)]);
        Ok(())
    }

    #[test]
    fn markup_is_stripped_and_entities_decoded() {
        let text = plain_text("<p>Column:&nbsp;<b>1-2</b></p><p>A &amp; B</p>");
        assert!(text.contains("1-2"));
        assert!(text.contains("A & B"));
        assert!(!text.contains("<b>"));
    }
}
