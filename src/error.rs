use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum PlayerError {
    #[error("Could not retrieve articles. Check network connection. ({detail})")]
    FeedUnreachable { detail: String },
    #[error("Audio is not yet available for this show.")]
    AudioNotAvailable,
    #[error("playlist is empty")]
    EmptyPlaylist,
    #[error("failed to launch {player}: {detail}")]
    PlayerLaunch { player: String, detail: String },
    #[error("cannot run {player}: {detail}")]
    PlayerMissing { player: String, detail: String },
    #[error("no playable episode in playlist")]
    NothingPlayable,
    #[error("terminal input setup failed: {detail}")]
    Terminal { detail: String },
}

impl PlayerError {
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::FeedUnreachable { .. } | Self::EmptyPlaylist => 2,
            Self::PlayerLaunch { .. } | Self::PlayerMissing { .. } | Self::NothingPlayable => 3,
            Self::Terminal { .. } => 4,
            Self::AudioNotAvailable => 1,
        }
    }
}

pub(crate) fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PlayerError>())
        .map_or(1, PlayerError::exit_code)
}
