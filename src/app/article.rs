use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};

use super::feed::ShowInfo;
use super::source::{Episode, PlaylistEntry, UnplayableEpisode};
use crate::error::PlayerError;

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css}: {err:?}"))
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(document: &Html, css: &str) -> Result<Option<String>> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty()))
}

pub(crate) fn parse_article(
    raw_html: &str,
    source_url: &str,
    show: &ShowInfo,
) -> Result<PlaylistEntry> {
    let document = Html::parse_document(raw_html);

    let title = match first_text(&document, "div.storytitle")? {
        Some(title) => Some(title),
        None => first_text(&document, "title")?,
    };

    let download = selector("a.download[href]")?;
    let audio_url = document
        .select(&download)
        .next()
        .and_then(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty());

    let Some(audio_url) = audio_url else {
        return Ok(PlaylistEntry::Unplayable(UnplayableEpisode {
            source_url: source_url.to_string(),
            title,
            reason: PlayerError::AudioNotAvailable.to_string(),
        }));
    };

    let program = first_text(&document, "a.program")?.unwrap_or_else(|| show.title.clone());
    let date = first_text(&document, "span.date")?.unwrap_or_else(|| show.date.clone());

    Ok(PlaylistEntry::Playable(Episode {
        title: title.unwrap_or_else(|| source_url.to_string()),
        program,
        date,
        audio_url: audio_url.to_string(),
        source_url: source_url.to_string(),
    }))
}
