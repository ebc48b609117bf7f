mod article;
mod feed;
mod playback;
mod source;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::cli::{Cli, Command, PlayerArgs, SourceArgs};
use crate::http::{FetchPolicy, download_to_dir};
use crate::paths::default_download_dir;

use self::feed::Program;
use self::playback::{
    ControllerOptions, PlaybackController, PlayerConfig, PlayerLauncher, TerminalKeys,
    resolve_player_bin,
};
use self::source::{NprSource, PlaylistEntry, PlaylistSource};

pub fn run(cli: Cli) -> Result<()> {
    let source = npr_source(&cli.source);

    match cli.command {
        Some(Command::Play) | None => run_play(source, &cli.player),
        Some(Command::List { json }) => run_list(source, json),
        Some(Command::Download { index, dir }) => run_download(source, index, dir),
    }
}

fn npr_source(args: &SourceArgs) -> NprSource {
    let feed_url = match (&args.feed, args.program) {
        (Some(feed), _) => feed.clone(),
        (None, Some(program)) => Program::from(program).feed_url().to_string(),
        (None, None) => Program::today().feed_url().to_string(),
    };
    NprSource::new(feed_url, FetchPolicy::default())
}

fn run_play(source: NprSource, args: &PlayerArgs) -> Result<()> {
    let config = PlayerConfig {
        bin: args.player.clone().unwrap_or_else(resolve_player_bin),
        cache_min: args.cache_min,
        console_controls: args.console_controls,
    };
    let options = ControllerOptions {
        poll_interval: Duration::from_millis(args.poll_ms),
        verbose: !args.quiet,
        ..ControllerOptions::default()
    };

    let mut controller =
        PlaybackController::new(source, PlayerLauncher::new(config), TerminalKeys, options)?;
    controller.play(None)
}

fn load_entries(mut source: NprSource) -> Result<(feed::ShowInfo, Vec<PlaylistEntry>)> {
    let show = source.load_show()?;
    let entries = source.resolve_episodes(&show)?;
    Ok((show, entries))
}

fn run_list(source: NprSource, json: bool) -> Result<()> {
    let (show, entries) = load_entries(source)?;

    if json {
        let payload = serde_json::json!({
            "title": show.title,
            "date": show.date,
            "episodes": entries,
        });
        let rendered =
            serde_json::to_string_pretty(&payload).context("failed to render playlist")?;
        println!("{rendered}");
        return Ok(());
    }

    println!("{show}");
    println!("{:<4} {:<56} {:<12}", "#", "TITLE", "AUDIO");
    for (index, entry) in entries.iter().enumerate() {
        let audio = if entry.episode().is_some() {
            "ready"
        } else {
            "unavailable"
        };
        println!("{:<4} {:<56} {:<12}", index, truncate(entry.title(), 56), audio);
    }
    Ok(())
}

fn run_download(source: NprSource, index: usize, dir: Option<PathBuf>) -> Result<()> {
    let (_, entries) = load_entries(source)?;
    let entry = entries
        .get(index)
        .ok_or_else(|| anyhow!("no episode at position {index} ({} in playlist)", entries.len()))?;
    let episode = match entry {
        PlaylistEntry::Playable(episode) => episode,
        PlaylistEntry::Unplayable(unplayable) => {
            return Err(anyhow!(
                "{} cannot be downloaded: {}",
                entry.title(),
                unplayable.reason
            ));
        }
    };

    let dir = match dir {
        Some(dir) => dir,
        None => default_download_dir()?,
    };
    println!("Downloading URL: {}", episode.audio_url);
    let path = download_to_dir(&episode.audio_url, &dir, &FetchPolicy::default())?;
    println!("Saved {} to {}", episode.title, path.display());
    Ok(())
}

pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    let count = input.chars().count();
    if count <= max_chars {
        return input.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let mut out = input.chars().take(max_chars - 3).collect::<String>();
    out.push_str("...");
    out
}
