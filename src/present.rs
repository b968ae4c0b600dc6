//! Read-only views of the most recent record.
//!
//! [`render_latest`] produces a [`Display`]; the text and HTML renderers
//! turn that into output for the CLI and for embedding in other pages.  The
//! payload is shown as stored and never re-parsed.

use chrono::{DateTime, Local, Utc};

use crate::error::StoreError;
use crate::record::{newest_first, FetchedRecord};
use crate::store::RecordStore;

/// Local date/time format used for "Date Retrieved".
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shown when there is nothing to display.
pub const EMPTY_MESSAGE: &str = "No data available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayModel {
    pub key: String,
    pub payload: String,
    pub retrieved_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display {
    Record(DisplayModel),
    Empty,
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(DATE_FORMAT).to_string()
}

impl From<&FetchedRecord> for DisplayModel {
    fn from(record: &FetchedRecord) -> Self {
        Self {
            key: record.key.clone(),
            payload: record.payload.clone(),
            retrieved_at: format_timestamp(record.retrieved_at),
        }
    }
}

pub fn render_latest(store: &dyn RecordStore) -> Result<Display, StoreError> {
    Ok(match store.latest()? {
        Some(record) => Display::Record(DisplayModel::from(&record)),
        None => Display::Empty,
    })
}

impl Display {
    /// Title, body and a "Date Retrieved" footer.
    pub fn render_text(&self) -> String {
        match self {
            Display::Empty => EMPTY_MESSAGE.to_string(),
            Display::Record(m) => format!(
                "{}\n\n{}\n\nDate Retrieved: {}",
                m.key, m.payload, m.retrieved_at
            ),
        }
    }

    /// An HTML fragment suitable for embedding in a page.
    pub fn render_html(&self) -> String {
        match self {
            Display::Empty => format!("<p>{EMPTY_MESSAGE}</p>"),
            Display::Record(m) => format!(
                "<div class=\"api-data\">\n\
                 <h2>{}</h2>\n\
                 <div class=\"content\">\n<pre>{}</pre>\n</div>\n\
                 <p><strong>Date Retrieved:</strong> {}</p>\n\
                 </div>",
                escape_html(&m.key),
                escape_html(&m.payload),
                escape_html(&m.retrieved_at)
            ),
        }
    }
}

/// One line per record, newest first: id, local retrieval time, key.
pub fn render_listing(records: &[FetchedRecord]) -> String {
    if records.is_empty() {
        return EMPTY_MESSAGE.to_string();
    }
    let mut sorted: Vec<&FetchedRecord> = records.iter().collect();
    sorted.sort_by(|a, b| newest_first(a, b));
    sorted
        .into_iter()
        .map(|r| format!("{:>5}  {}  {}", r.id.to_string(), format_timestamp(r.retrieved_at), r.key))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn model() -> DisplayModel {
        DisplayModel {
            key: "BPI".into(),
            payload: "{\n    \"rate\": \"50000\"\n}".into(),
            retrieved_at: "2026-10-18 08:00:00".into(),
        }
    }

    #[test]
    fn empty_store_renders_empty_state() {
        let store = MemoryStore::new();
        let display = render_latest(&store).unwrap();
        assert_eq!(display, Display::Empty);
        assert_eq!(display.render_text(), "No data available.");
        assert_eq!(display.render_html(), "<p>No data available.</p>");
    }

    #[test]
    fn render_latest_picks_newest_record() {
        let store = MemoryStore::new();
        let early = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 10, 18, 8, 30, 0).unwrap();
        store.upsert("Old", "{}", early).unwrap();
        store.upsert("BPI", "{\"x\": 1}", late).unwrap();

        match render_latest(&store).unwrap() {
            Display::Record(m) => {
                assert_eq!(m.key, "BPI");
                assert_eq!(m.payload, "{\"x\": 1}");
                assert_eq!(m.retrieved_at, format_timestamp(late));
            }
            Display::Empty => panic!("store is not empty"),
        }
        assert_eq!(store.list().unwrap().len(), 2, "rendering does not mutate");
    }

    #[test]
    fn text_rendering_has_title_body_footer() {
        let text = Display::Record(model()).render_text();
        assert_eq!(
            text,
            "BPI\n\n{\n    \"rate\": \"50000\"\n}\n\nDate Retrieved: 2026-10-18 08:00:00"
        );
    }

    #[test]
    fn html_rendering_escapes_everything() {
        let mut m = model();
        m.key = "<b>BPI</b>".into();
        m.payload = "{\"a\": \"x & y\"}".into();
        let html = Display::Record(m).render_html();

        assert!(html.contains("<h2>&lt;b&gt;BPI&lt;/b&gt;</h2>"));
        assert!(html.contains("<pre>{&quot;a&quot;: &quot;x &amp; y&quot;}</pre>"));
        assert!(html.contains("<strong>Date Retrieved:</strong> 2026-10-18 08:00:00"));
    }

    #[test]
    fn listing_is_newest_first_with_ids() {
        let early = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 10, 18, 8, 30, 0).unwrap();
        let records = vec![
            crate::record::make_record(1, "Old", early),
            crate::record::make_record(2, "BPI", late),
        ];

        let listing = render_listing(&records);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], format!("   #2  {}  BPI", format_timestamp(late)));
        assert_eq!(lines[1], format!("   #1  {}  Old", format_timestamp(early)));
    }

    #[test]
    fn empty_listing() {
        assert_eq!(render_listing(&[]), EMPTY_MESSAGE);
    }

    #[test]
    fn timestamp_format_shape() {
        let formatted = format_timestamp(Utc::now());
        assert_eq!(formatted.len(), "2026-10-18 08:00:00".len());
        assert_eq!(&formatted[4..5], "-");
        assert_eq!(&formatted[10..11], " ");
    }
}
