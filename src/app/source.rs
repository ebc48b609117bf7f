use std::thread;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{debug, warn};

use super::article::parse_article;
use super::feed::{ShowInfo, parse_feed};
use crate::error::PlayerError;
use crate::http::{FetchPolicy, get_text_with_retries};

const MAX_PARALLEL_ARTICLES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Episode {
    pub(crate) title: String,
    pub(crate) program: String,
    pub(crate) date: String,
    pub(crate) audio_url: String,
    pub(crate) source_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct UnplayableEpisode {
    pub(crate) source_url: String,
    pub(crate) title: Option<String>,
    pub(crate) reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum PlaylistEntry {
    Playable(Episode),
    Unplayable(UnplayableEpisode),
}

impl PlaylistEntry {
    pub(crate) fn title(&self) -> &str {
        match self {
            Self::Playable(episode) => &episode.title,
            Self::Unplayable(entry) => entry.title.as_deref().unwrap_or(&entry.source_url),
        }
    }

    pub(crate) fn episode(&self) -> Option<&Episode> {
        match self {
            Self::Playable(episode) => Some(episode),
            Self::Unplayable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub(crate) fn new(entries: Vec<PlaylistEntry>) -> Self {
        Self { entries }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&PlaylistEntry> {
        self.entries.get(index)
    }
}

pub(crate) trait PlaylistSource {
    fn load_show(&mut self) -> Result<ShowInfo>;

    fn resolve_episodes(&mut self, show: &ShowInfo) -> Result<Vec<PlaylistEntry>>;
}

#[derive(Debug, Clone)]
pub(crate) struct NprSource {
    feed_url: String,
    policy: FetchPolicy,
}

impl NprSource {
    pub(crate) fn new(feed_url: impl Into<String>, policy: FetchPolicy) -> Self {
        Self {
            feed_url: feed_url.into(),
            policy,
        }
    }
}

impl PlaylistSource for NprSource {
    fn load_show(&mut self) -> Result<ShowInfo> {
        debug!(feed = %self.feed_url, "fetching feed");
        let raw = get_text_with_retries(&self.feed_url, &self.policy)
            .map_err(|detail| PlayerError::FeedUnreachable { detail })?;
        let show = parse_feed(&raw).map_err(|err| PlayerError::FeedUnreachable {
            detail: err.to_string(),
        })?;
        debug!(title = %show.title, articles = show.articles.len(), "feed loaded");
        Ok(show)
    }

    fn resolve_episodes(&mut self, show: &ShowInfo) -> Result<Vec<PlaylistEntry>> {
        let policy = self.policy;
        let mut entries = Vec::with_capacity(show.articles.len());

        for batch in show.articles.chunks(MAX_PARALLEL_ARTICLES) {
            let resolved = thread::scope(|scope| {
                let workers: Vec<_> = batch
                    .iter()
                    .map(|url| scope.spawn(move || resolve_article(url, show, &policy)))
                    .collect();
                workers
                    .into_iter()
                    .zip(batch)
                    .map(|(worker, url)| {
                        worker.join().unwrap_or_else(|_| {
                            Err(anyhow!("article resolver panicked for {url}"))
                        })
                    })
                    .collect::<Vec<_>>()
            });
            for (entry, url) in resolved.into_iter().zip(batch) {
                entries.push(entry.unwrap_or_else(|err| {
                    warn!(url = %url, "article unavailable: {err:#}");
                    PlaylistEntry::Unplayable(UnplayableEpisode {
                        source_url: url.clone(),
                        title: None,
                        reason: format!("{err:#}"),
                    })
                }));
            }
        }

        Ok(entries)
    }
}

fn resolve_article(url: &str, show: &ShowInfo, policy: &FetchPolicy) -> Result<PlaylistEntry> {
    let raw = get_text_with_retries(url, policy).map_err(|err| anyhow!(err))?;
    parse_article(&raw, url, show)
}
