//! HTML parsing for listing and detail pages.
//!
//! Detail pages carry a label/value table, a narrative block introduced by a
//! `<span class="caption">Narrative:</span>`, and a citation list introduced
//! by a `<div class="captionhr">Sources:</div>`.

use accident_harvest_models::{FieldTag, NormalizedRecord, SourceKey};
use scraper::{ElementRef, Html, Selector};

/// Why a detail page produced no record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetailParseError {
    /// The page has no label/value table.
    #[error("no label/value table on page")]
    MissingTable,

    /// The record identifier could not be derived from the page URL.
    #[error("no record identifier in URL {0}")]
    MissingKey(String),
}

/// Maps a normalized row label to a field.
#[derive(Debug, Clone, Copy)]
pub struct LabelRule {
    pub tag: FieldTag,
    /// Substring the label must contain.
    pub contains: &'static str,
    /// Substring that disqualifies the label even if `contains` matches.
    pub excludes: Option<&'static str>,
}

impl LabelRule {
    const fn new(tag: FieldTag, contains: &'static str) -> Self {
        Self {
            tag,
            contains,
            excludes: None,
        }
    }

    const fn excluding(tag: FieldTag, contains: &'static str, excludes: &'static str) -> Self {
        Self {
            tag,
            contains,
            excludes: Some(excludes),
        }
    }

    fn matches(&self, label: &str) -> bool {
        label.contains(self.contains) && self.excludes.is_none_or(|ex| !label.contains(ex))
    }
}

/// Label rules, evaluated in order. The first match wins.
pub const LABEL_RULES: &[LabelRule] = &[
    LabelRule::new(FieldTag::Date, "date"),
    LabelRule::new(FieldTag::Time, "time"),
    LabelRule::excluding(FieldTag::AircraftType, "type", "aircraft"),
    LabelRule::new(FieldTag::OwnerOperator, "owner/operator"),
    LabelRule::new(FieldTag::Registration, "registration"),
    LabelRule::new(FieldTag::Msn, "msn"),
    LabelRule::new(FieldTag::YearOfManufacture, "year of manufacture"),
    LabelRule::excluding(FieldTag::Fatalities, "fatalities", "other"),
    LabelRule::new(FieldTag::AircraftDamage, "aircraft damage"),
    LabelRule::new(FieldTag::Location, "location"),
    LabelRule::new(FieldTag::Phase, "phase"),
    LabelRule::new(FieldTag::Nature, "nature"),
    LabelRule::new(FieldTag::DepartureAirport, "departure airport"),
    LabelRule::new(FieldTag::DestinationAirport, "destination airport"),
    LabelRule::new(FieldTag::ConfidenceRating, "confidence rating"),
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| unreachable!("static selector {css} is valid"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

/// Lower-cases a row label and strips its trailing colon.
#[must_use]
pub fn normalize_label(raw: &str) -> String {
    raw.trim().trim_end_matches(':').trim().to_lowercase()
}

/// Returns the field a raw row label maps to, if any.
#[must_use]
pub fn match_label(raw: &str) -> Option<FieldTag> {
    let label = normalize_label(raw);
    LABEL_RULES
        .iter()
        .find(|rule| rule.matches(&label))
        .map(|rule| rule.tag)
}

/// Extracts detail page URLs from a listing page, in page order and without
/// duplicates. Relative links are resolved against `base_url`.
#[must_use]
pub fn parse_listing(html: &str, base_url: &str, detail_marker: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let row_sel = selector("tr.list");
    let link_sel = selector("a[href]");

    let mut urls: Vec<String> = Vec::new();

    for row in document.select(&row_sel) {
        let Some(href) = row
            .select(&link_sel)
            .next()
            .and_then(|link| link.value().attr("href"))
        else {
            continue;
        };

        if !href.contains(detail_marker) {
            continue;
        }

        let url = if href.starts_with("http") {
            href.to_owned()
        } else {
            format!("{}{href}", base_url.trim_end_matches('/'))
        };

        if !urls.contains(&url) {
            urls.push(url);
        }
    }

    urls
}

/// Resolves a location from the raw cell text when no country link exists:
/// the last dash-separated segment, or the trimmed text itself.
///
/// ```
/// use accident_harvest_source::aviation_safety::parse::location_from_text;
///
/// assert_eq!(location_from_text("Near CityX - CountryY"), "CountryY");
/// assert_eq!(location_from_text("  Atlantic Ocean "), "Atlantic Ocean");
/// ```
#[must_use]
pub fn location_from_text(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some((_, last)) = trimmed.rsplit_once('-') {
        let last = last.trim();
        if !last.is_empty() {
            return last.to_owned();
        }
    }

    trimmed.to_owned()
}

fn resolve_location(cell: ElementRef<'_>) -> String {
    let country_sel = selector(r#"a[href*="/country/"]"#);

    if let Some(link) = cell.select(&country_sel).next() {
        let country = element_text(link);
        if !country.is_empty() {
            return country;
        }
    }

    location_from_text(&element_text(cell))
}

fn resolve_type(cell: ElementRef<'_>) -> String {
    let link_sel = selector("a");

    cell.select(&link_sel)
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| element_text(cell))
}

fn parse_narrative(document: &Html) -> Option<String> {
    let caption_sel = selector("span.caption");
    let caption = document
        .select(&caption_sel)
        .find(|el| element_text(*el) == "Narrative:")?;

    let mut passed_element = false;

    for sibling in caption.next_siblings() {
        if let Some(element) = ElementRef::wrap(sibling) {
            match element.value().name() {
                "br" => {}
                "span" if !passed_element => {
                    let text = element_text(element);
                    if !text.is_empty() {
                        return Some(text);
                    }
                    passed_element = true;
                }
                _ => passed_element = true,
            }
        } else if let Some(text) = sibling.value().as_text() {
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_owned());
            }
        }
    }

    None
}

fn push_link(sources: &mut Vec<String>, link: ElementRef<'_>) {
    let target = link
        .value()
        .attr("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map_or_else(|| element_text(link), str::to_owned);

    if !target.is_empty() {
        sources.push(target);
    }
}

fn parse_sources(document: &Html) -> Vec<String> {
    let caption_sel = selector("div.captionhr");
    let link_sel = selector("a");

    let Some(caption) = document
        .select(&caption_sel)
        .find(|el| element_text(*el) == "Sources:")
    else {
        return Vec::new();
    };

    let mut sources = Vec::new();

    for sibling in caption.next_siblings().filter_map(ElementRef::wrap) {
        match sibling.value().name() {
            "div" => break,
            "a" => push_link(&mut sources, sibling),
            _ => {
                for link in sibling.select(&link_sel) {
                    push_link(&mut sources, link);
                }
            }
        }
    }

    sources
}

/// Parses one detail page into a record.
///
/// # Errors
///
/// Returns [`DetailParseError`] if the URL carries no record identifier or
/// the page has no label/value table.
pub fn parse_detail(html: &str, url: &str) -> Result<NormalizedRecord, DetailParseError> {
    let source_key =
        SourceKey::from_url(url).ok_or_else(|| DetailParseError::MissingKey(url.to_owned()))?;

    let document = Html::parse_document(html);
    let table_sel = selector("table");
    let row_sel = selector("tr");
    let cell_sel = selector("td");

    let table = document
        .select(&table_sel)
        .next()
        .ok_or(DetailParseError::MissingTable)?;

    let mut record = NormalizedRecord::new(url, source_key);

    for row in table.select(&row_sel) {
        let cells: Vec<ElementRef<'_>> = row.select(&cell_sel).collect();
        let [caption, value, ..] = cells.as_slice() else {
            continue;
        };

        let Some(tag) = match_label(&element_text(*caption)) else {
            continue;
        };

        let text = match tag {
            FieldTag::AircraftType => resolve_type(*value),
            FieldTag::Location => resolve_location(*value),
            _ => element_text(*value),
        };
        record.set(tag, &text);
    }

    if let Some(narrative) = parse_narrative(&document) {
        record.set(FieldTag::Narrative, &narrative);
    }
    record.sources = parse_sources(&document);

    Ok(record)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const DETAIL_HTML: &str = r#"<html><body><div class="innertube">
<table>
<tr><td class="caption">Date:</td><td class="caption">Monday 4 January 2010</td></tr>
<tr><td class="caption">Time:</td><td class="desc"></td></tr>
<tr><td class="caption">Type:</td><td class="desc"><a href="/asndb/type/C172">Cessna 172S Skyhawk SP</a></td></tr>
<tr><td class="caption">Owner/operator:</td><td class="desc">Private</td></tr>
<tr><td class="caption">Registration:</td><td class="desc">N12345</td></tr>
<tr><td class="caption">MSN:</td><td class="desc">172S8765</td></tr>
<tr><td class="caption">Year of manufacture:</td><td class="desc">2001</td></tr>
<tr><td class="caption">Fatalities:</td><td class="desc">Fatalities: 0 / Occupants: 2</td></tr>
<tr><td class="caption">Other fatalities:</td><td class="desc">1</td></tr>
<tr><td class="caption">Aircraft damage:</td><td class="desc">Substantial</td></tr>
<tr><td class="caption">Location:</td><td class="desc">Near Springfield, IL - <a href="/asndb/country/N">United States of America</a></td></tr>
<tr><td class="caption">Phase:</td><td class="desc">Landing</td></tr>
<tr><td class="caption">Nature:</td><td class="desc">Private</td></tr>
<tr><td class="caption">Departure airport:</td><td class="desc">Springfield (SPI)</td></tr>
<tr><td class="caption">Destination airport:</td><td class="desc"></td></tr>
<tr><td class="caption">Confidence Rating:</td><td class="desc">Accident investigation report completed</td></tr>
</table>
<span class="caption">Narrative:</span><br><span>The aircraft overran the runway on landing.</span>
<br><br>
<div class="captionhr">Sources:</div>
<br><a href="https://www.ntsb.gov/report/1">NTSB</a><br>
<p><a href="https://example.com/news">news</a> <a>Local newspaper</a></p>
<div class="captionhr">Media:</div>
<a href="https://example.com/photo">photo</a>
</div></body></html>"#;

    pub fn detail_with_location(location_cell: &str) -> String {
        format!(
            r#"<html><body><table>
<tr><td>Date:</td><td>Friday 1 January 2010</td></tr>
<tr><td>Location:</td><td>{location_cell}</td></tr>
</table></body></html>"#
        )
    }

    #[test]
    fn parses_every_known_label() {
        let record =
            parse_detail(DETAIL_HTML, "https://aviation-safety.net/wikibase/301234").unwrap();

        assert_eq!(record.source_key.as_str(), "301234");
        assert_eq!(record.get(FieldTag::Date), Some("Monday 4 January 2010"));
        assert_eq!(record.get(FieldTag::AircraftType), Some("Cessna 172S Skyhawk SP"));
        assert_eq!(record.get(FieldTag::OwnerOperator), Some("Private"));
        assert_eq!(record.get(FieldTag::Registration), Some("N12345"));
        assert_eq!(record.get(FieldTag::Msn), Some("172S8765"));
        assert_eq!(record.get(FieldTag::YearOfManufacture), Some("2001"));
        assert_eq!(
            record.get(FieldTag::Fatalities),
            Some("Fatalities: 0 / Occupants: 2")
        );
        assert_eq!(record.get(FieldTag::AircraftDamage), Some("Substantial"));
        assert_eq!(record.get(FieldTag::Location), Some("United States of America"));
        assert_eq!(record.get(FieldTag::Phase), Some("Landing"));
        assert_eq!(record.get(FieldTag::Nature), Some("Private"));
        assert_eq!(record.get(FieldTag::DepartureAirport), Some("Springfield (SPI)"));
        assert_eq!(
            record.get(FieldTag::ConfidenceRating),
            Some("Accident investigation report completed")
        );
    }

    #[test]
    fn empty_cells_are_omitted() {
        let record = parse_detail(DETAIL_HTML, "https://aviation-safety.net/wikibase/1").unwrap();

        assert_eq!(record.get(FieldTag::Time), None);
        assert_eq!(record.get(FieldTag::DestinationAirport), None);
        assert!(!record.fields.contains_key(&FieldTag::Time));
    }

    #[test]
    fn other_fatalities_do_not_override_fatalities() {
        let record = parse_detail(DETAIL_HTML, "https://aviation-safety.net/wikibase/1").unwrap();
        assert_eq!(
            record.get(FieldTag::Fatalities),
            Some("Fatalities: 0 / Occupants: 2")
        );
    }

    #[test]
    fn parses_narrative_from_following_span() {
        let record = parse_detail(DETAIL_HTML, "https://aviation-safety.net/wikibase/1").unwrap();
        assert_eq!(
            record.get(FieldTag::Narrative),
            Some("The aircraft overran the runway on landing.")
        );
    }

    #[test]
    fn parses_narrative_from_plain_text_sibling() {
        let html = r#"<html><body><table><tr><td>Date:</td><td>x</td></tr></table>
<span class="caption">Narrative:</span> Engine failure after takeoff. <b>bold</b></body></html>"#;
        let record = parse_detail(html, "https://aviation-safety.net/wikibase/2").unwrap();
        assert_eq!(
            record.get(FieldTag::Narrative),
            Some("Engine failure after takeoff.")
        );
    }

    #[test]
    fn missing_narrative_is_absent() {
        let html = "<html><body><table><tr><td>Date:</td><td>x</td></tr></table></body></html>";
        let record = parse_detail(html, "https://aviation-safety.net/wikibase/3").unwrap();
        assert_eq!(record.get(FieldTag::Narrative), None);
        assert!(record.sources.is_empty());
    }

    #[test]
    fn collects_sources_until_next_block() {
        let record = parse_detail(DETAIL_HTML, "https://aviation-safety.net/wikibase/1").unwrap();
        assert_eq!(
            record.sources,
            vec![
                "https://www.ntsb.gov/report/1".to_owned(),
                "https://example.com/news".to_owned(),
                "Local newspaper".to_owned(),
            ]
        );
    }

    #[test]
    fn location_prefers_country_link() {
        let html = detail_with_location(
            r#"Near CityX - <a href="/asndb/country/F">France</a>"#,
        );
        let record = parse_detail(&html, "https://aviation-safety.net/wikibase/4").unwrap();
        assert_eq!(record.get(FieldTag::Location), Some("France"));
    }

    #[test]
    fn location_falls_back_to_last_dash_segment() {
        let html = detail_with_location("Near CityX - CountryY");
        let record = parse_detail(&html, "https://aviation-safety.net/wikibase/5").unwrap();
        assert_eq!(record.get(FieldTag::Location), Some("CountryY"));
    }

    #[test]
    fn location_falls_back_to_trimmed_text() {
        let html = detail_with_location("   Atlantic Ocean  ");
        let record = parse_detail(&html, "https://aviation-safety.net/wikibase/6").unwrap();
        assert_eq!(record.get(FieldTag::Location), Some("Atlantic Ocean"));
    }

    #[test]
    fn page_without_table_is_rejected() {
        let result = parse_detail(
            "<html><body><p>Access denied</p></body></html>",
            "https://aviation-safety.net/wikibase/7",
        );
        assert_eq!(result, Err(DetailParseError::MissingTable));
    }

    #[test]
    fn url_without_identifier_is_rejected() {
        let result = parse_detail(DETAIL_HTML, "https://aviation-safety.net/");
        assert!(matches!(result, Err(DetailParseError::MissingKey(_))));
    }

    #[test]
    fn label_rules_resolve_in_declaration_order() {
        assert_eq!(match_label("Type:"), Some(FieldTag::AircraftType));
        assert_eq!(match_label("Aircraft type:"), None);
        assert_eq!(match_label("Aircraft damage:"), Some(FieldTag::AircraftDamage));
        assert_eq!(match_label("Other fatalities:"), None);
        assert_eq!(match_label("Date of registration:"), Some(FieldTag::Date));
        assert_eq!(match_label("Confidence Rating:"), Some(FieldTag::ConfidenceRating));
        assert_eq!(match_label("Crew:"), None);
    }

    #[test]
    fn listing_collects_detail_links_in_order() {
        let html = r#"<html><body><table>
<tr><th>date</th></tr>
<tr class="list"><td><a href="/wikibase/100">04-JAN-2010</a></td><td><a href="/asndb/type/C172">C172</a></td></tr>
<tr class="list"><td><a href="https://aviation-safety.net/wikibase/101">05-JAN-2010</a></td></tr>
<tr class="list"><td><a href="/wikibase/100">duplicate</a></td></tr>
<tr class="list"><td><a href="/asndb/type/B738">not a detail link</a></td></tr>
<tr><td><a href="/wikibase/999">not a list row</a></td></tr>
</table></body></html>"#;

        let urls = parse_listing(html, "https://aviation-safety.net/", "/wikibase/");

        assert_eq!(
            urls,
            vec![
                "https://aviation-safety.net/wikibase/100".to_owned(),
                "https://aviation-safety.net/wikibase/101".to_owned(),
            ]
        );
    }

    #[test]
    fn listing_without_rows_is_empty() {
        let urls = parse_listing(
            "<html><body><p>No results</p></body></html>",
            "https://x",
            "/wikibase/",
        );
        assert!(urls.is_empty());
    }
}
