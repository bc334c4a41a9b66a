//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the session layer.
//! Each handler takes CLI args, the loaded config and Output, returns ExitCode.

use log::{debug, warn};

use crate::cli::{
    BrowseCmd, DownloadCmd, DownloadResponse, ExitCode, HashCmd, HashResponse, InfoCmd, Output,
    SearchCmd,
};
use crate::config::Config;
use crate::error::{ErrorKind, SubtleError};
use crate::models::{SortField, SubtitleMatches, VideoIdentity};
use crate::navigator::Navigator;
use crate::session::{Credentials, SessionManager, MAX_SEARCH_LIMIT};

/// Map a library error to an exit code, `fallback` for non-fatal failures
pub fn exit_code_for(err: &SubtleError, fallback: ExitCode) -> ExitCode {
    match err {
        SubtleError::Unreachable(_) => ExitCode::Unreachable,
        SubtleError::LoginFailed(_) => ExitCode::LoginFailed,
        _ if err.kind() == ErrorKind::Contract => ExitCode::InvalidArgs,
        _ => fallback,
    }
}

fn fail(output: &Output, err: SubtleError, fallback: ExitCode) -> ExitCode {
    output.error(err.to_string(), exit_code_for(&err, fallback))
}

// =============================================================================
// Hash Command
// =============================================================================

pub async fn hash_cmd(cmd: HashCmd, output: &Output) -> ExitCode {
    let video = match VideoIdentity::open(&cmd.file) {
        Ok(video) => video,
        Err(e) => {
            return output.error(
                format!("Cannot open {}: {}", cmd.file.display(), e),
                ExitCode::InvalidArgs,
            )
        }
    };

    if output.json {
        let response = HashResponse {
            file: video.path().display().to_string(),
            size: video.size(),
            hash: video.fingerprint().to_string(),
        };
        if let Err(e) = output.print(response) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.line(format!("{}  {}  {}", video.fingerprint(), video.size(), video.file_name()));
    }
    ExitCode::Success
}

// =============================================================================
// Browse Command
// =============================================================================

pub async fn browse_cmd(cmd: BrowseCmd, output: &Output) -> ExitCode {
    let navigator = match cmd.dir {
        Some(dir) => Navigator::new(dir),
        None => std::env::current_dir()
            .map_err(SubtleError::from)
            .and_then(Navigator::new),
    };
    let navigator = match navigator {
        Ok(nav) => nav,
        Err(e) => return output.error(e.to_string(), ExitCode::InvalidArgs),
    };

    let listing = match navigator.list() {
        Ok(listing) => listing,
        Err(e) => return output.error(format!("Cannot list directory: {}", e), ExitCode::Error),
    };

    if output.json {
        if let Err(e) = output.print(&listing) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
        return ExitCode::Success;
    }

    output.info(format!("{}", listing.directory.display()));
    if listing.is_empty() {
        output.info("No folders or video files here");
    }
    if listing.parent.is_some() {
        output.line("../");
    }
    for dir in &listing.directories {
        output.line(format!("{}/", dir));
    }
    for video in &listing.videos {
        output.line(video);
    }
    ExitCode::Success
}

// =============================================================================
// Info Command
// =============================================================================

pub async fn info_cmd(_cmd: InfoCmd, config: &Config, output: &Output) -> ExitCode {
    let session = match SessionManager::connect(config.to_session_config()).await {
        Ok(session) => session,
        Err(e) => return fail(output, e, ExitCode::Unreachable),
    };

    let info = session.server_info().clone();
    if output.json {
        if let Err(e) = output.print(&info) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        output.line(&info);
        if let Some(files) = info.subtitle_files {
            output.line(format!("Subtitle files: {}", files));
        }
        if let Some(movies) = info.movies_total {
            output.line(format!("Movies: {}", movies));
        }
    }
    ExitCode::Success
}

// =============================================================================
// Session Helpers
// =============================================================================

/// Connect and log in. Falls back to an anonymous login without credentials.
async fn open_session(config: &Config, output: &Output) -> Result<SessionManager, ExitCode> {
    let session = SessionManager::connect(config.to_session_config())
        .await
        .map_err(|e| fail(output, e, ExitCode::Unreachable))?;

    let credentials = config.credentials().unwrap_or_else(|| {
        output.info("No credentials configured, logging in anonymously");
        Credentials::from_md5("", "")
    });

    if let Err(e) = session.login(&credentials).await {
        session.shutdown().await;
        return Err(fail(output, e, ExitCode::LoginFailed));
    }
    Ok(session)
}

fn search_limit(requested: Option<u32>, config: &Config) -> u32 {
    requested
        .or(config.search_limit)
        .unwrap_or(MAX_SEARCH_LIMIT)
}

/// Identify the video and run the fallback search
async fn find_subtitles(
    session: &SessionManager,
    video: &mut VideoIdentity,
    limit: u32,
    output: &Output,
) -> Result<SubtitleMatches, ExitCode> {
    match session.get_video_info(video).await {
        Ok(Some(movie)) => output.info(format!("Identified as {}", movie)),
        Ok(None) => debug!("No movie match for {}", video.file_name()),
        Err(e) if e.is_fatal() => return Err(fail(output, e, ExitCode::Error)),
        Err(e) => warn!("Movie lookup failed, searching without it: {}", e),
    }

    let matches = session
        .search(video, limit)
        .await
        .map_err(|e| fail(output, e, ExitCode::Error))?;

    if matches.is_empty() {
        return Err(output.error(
            format!("No subtitles found for {}", video.file_name()),
            ExitCode::NoSubtitles,
        ));
    }
    Ok(matches)
}

fn open_video(file: &std::path::Path, output: &Output) -> Result<VideoIdentity, ExitCode> {
    VideoIdentity::open(file).map_err(|e| {
        output.error(
            format!("Cannot open {}: {}", file.display(), e),
            ExitCode::InvalidArgs,
        )
    })
}

// =============================================================================
// Search Command
// =============================================================================

pub async fn search_cmd(cmd: SearchCmd, config: &Config, output: &Output) -> ExitCode {
    let mut video = match open_video(&cmd.file, output) {
        Ok(video) => video,
        Err(code) => return code,
    };
    let session = match open_session(config, output).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    let limit = search_limit(cmd.limit, config);
    let code = match find_subtitles(&session, &mut video, limit, output).await {
        Ok(mut matches) => {
            matches.sort_all(SortField::from(cmd.sort), cmd.order());
            print_matches(&matches, output)
        }
        Err(code) => code,
    };

    session.shutdown().await;
    code
}

fn print_matches(matches: &SubtitleMatches, output: &Output) -> ExitCode {
    if output.json {
        if let Err(e) = output.print(matches) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
        return ExitCode::Success;
    }

    for (language, candidates) in matches.iter() {
        let name = candidates
            .first()
            .map(|c| c.language_name.as_str())
            .unwrap_or(language);
        output.line(format!("{} ({}):", name, language));
        for candidate in candidates {
            output.line(format!("  {}", candidate));
        }
    }
    ExitCode::Success
}

// =============================================================================
// Download Command
// =============================================================================

pub async fn download_cmd(cmd: DownloadCmd, config: &Config, output: &Output) -> ExitCode {
    let mut video = match open_video(&cmd.file, output) {
        Ok(video) => video,
        Err(code) => return code,
    };
    let session = match open_session(config, output).await {
        Ok(session) => session,
        Err(code) => return code,
    };

    let limit = search_limit(cmd.limit, config);
    let code = match find_subtitles(&session, &mut video, limit, output).await {
        Ok(matches) => download_choice(&session, &video, &matches, &cmd, output).await,
        Err(code) => code,
    };

    session.shutdown().await;
    code
}

async fn download_choice(
    session: &SessionManager,
    video: &VideoIdentity,
    matches: &SubtitleMatches,
    cmd: &DownloadCmd,
    output: &Output,
) -> ExitCode {
    let candidate = match (cmd.id, cmd.lang.as_deref()) {
        (Some(id), _) => matches.find(id),
        // Groups come back most downloaded first
        (None, Some(lang)) => matches.best(Some(lang)),
        (None, None) => matches.best(None),
    };

    let Some(candidate) = candidate else {
        let wanted = match (cmd.id, &cmd.lang) {
            (Some(id), _) => format!("with id {}", id),
            (None, Some(lang)) => format!("in language '{}'", lang),
            (None, None) => String::new(),
        };
        return output.error(
            format!("No subtitle {} for {}", wanted, video.file_name()),
            ExitCode::NoSubtitles,
        );
    };

    output.info(format!("Downloading {}", candidate));
    match session.download(video, candidate).await {
        Ok(path) => {
            if output.json {
                let response = DownloadResponse {
                    status: "ok",
                    subtitle_id: candidate.download_id,
                    language: candidate.language_id.clone(),
                    path: path.display().to_string(),
                };
                if let Err(e) = output.print(response) {
                    return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
                }
            } else {
                output.line(path.display());
            }
            ExitCode::Success
        }
        Err(e) => fail(output, e, ExitCode::DownloadFailed),
    }
}
