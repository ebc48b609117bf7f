use std::fmt;

use anyhow::{Result, anyhow};
use chrono::{Datelike, Local, Weekday};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};

use crate::cli::ProgramArg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Program {
    MorningEdition,
    WeekendEditionSaturday,
    WeekendEditionSunday,
}

impl Program {
    pub(crate) fn feed_url(self) -> &'static str {
        match self {
            Self::MorningEdition => "http://www.npr.org/rss/rss.php?id=3",
            Self::WeekendEditionSaturday => "http://www.npr.org/rss/rss.php?id=7",
            Self::WeekendEditionSunday => "http://www.npr.org/rss/rss.php?id=10",
        }
    }

    pub(crate) fn airing_on(day: Weekday) -> Self {
        match day {
            Weekday::Sat => Self::WeekendEditionSaturday,
            Weekday::Sun => Self::WeekendEditionSunday,
            _ => Self::MorningEdition,
        }
    }

    pub(crate) fn today() -> Self {
        Self::airing_on(Local::now().weekday())
    }
}

impl From<ProgramArg> for Program {
    fn from(arg: ProgramArg) -> Self {
        match arg {
            ProgramArg::MorningEdition => Self::MorningEdition,
            ProgramArg::WeekendEditionSaturday => Self::WeekendEditionSaturday,
            ProgramArg::WeekendEditionSunday => Self::WeekendEditionSunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShowInfo {
    pub(crate) title: String,
    pub(crate) date: String,
    pub(crate) articles: Vec<String>,
}

impl fmt::Display for ShowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedField {
    Title,
    BuildDate,
    Link,
}

// Only unprefixed names match, so `itunes:title` or `atom:link` siblings
// never shadow the RSS elements.
fn field_at(path: &[String]) -> Option<FeedField> {
    let [.., parent, leaf] = path else {
        return None;
    };
    match (parent.as_str(), leaf.as_str()) {
        ("channel", "title") => Some(FeedField::Title),
        ("channel", "lastBuildDate") => Some(FeedField::BuildDate),
        ("item", "link") => Some(FeedField::Link),
        _ => None,
    }
}

fn resolve_reference(reference: &BytesRef<'_>) -> Result<String> {
    if let Some(ch) = reference.resolve_char_ref()? {
        return Ok(ch.to_string());
    }
    let name = reference.decode()?;
    Ok(match resolve_predefined_entity(&name) {
        Some(value) => value.to_string(),
        None => format!("&{name};"),
    })
}

pub(crate) fn parse_feed(raw: &str) -> Result<ShowInfo> {
    let mut reader = Reader::from_str(raw);
    let mut path: Vec<String> = Vec::new();
    let mut capture: Option<(FeedField, usize, String)> = None;
    let mut saw_channel = false;
    let mut title = None;
    let mut date = None;
    let mut articles = Vec::new();

    loop {
        let event = reader.read_event().map_err(|err| {
            anyhow!(
                "malformed RSS feed at byte {}: {err}",
                reader.error_position()
            )
        })?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                saw_channel |= name == "channel";
                path.push(name);
                if capture.is_none() {
                    capture = field_at(&path).map(|field| (field, path.len(), String::new()));
                }
            }
            Event::Empty(start) => {
                saw_channel |= start.name().as_ref() == b"channel";
            }
            Event::Text(text) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&text.decode()?);
                }
            }
            Event::CData(data) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&data.decode()?);
                }
            }
            Event::GeneralRef(reference) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&resolve_reference(&reference)?);
                }
            }
            Event::End(_) => {
                if let Some((field, depth, buf)) = capture.take() {
                    if depth == path.len() {
                        let text = buf.trim().to_string();
                        match field {
                            FeedField::Title => {
                                title.get_or_insert(text);
                            }
                            FeedField::BuildDate => {
                                date.get_or_insert(text);
                            }
                            FeedField::Link if !text.is_empty() => articles.push(text),
                            FeedField::Link => {}
                        }
                    } else {
                        capture = Some((field, depth, buf));
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(anyhow!("malformed RSS feed: no <channel> element"));
    }
    if articles.is_empty() {
        return Err(anyhow!("feed lists no articles"));
    }

    Ok(ShowInfo {
        title: title.unwrap_or_default(),
        date: date.unwrap_or_default(),
        articles,
    })
}
