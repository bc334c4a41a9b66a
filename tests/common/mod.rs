//! Shared helpers for the integration tests: XML-RPC response builders,
//! mockito setup for the handshake and login, and test video files.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mockito::{Matcher, Mock, Server, ServerGuard};
use subtle::session::{Credentials, SessionConfig, SessionManager};

pub const RPC_PATH: &str = "/xml-rpc";
pub const TOKEN: &str = "s3ss10nt0k3n";

// =============================================================================
// XML-RPC builders
// =============================================================================

pub fn string(v: &str) -> String {
    format!("<value><string>{}</string></value>", v)
}

pub fn int(v: i64) -> String {
    format!("<value><int>{}</int></value>", v)
}

pub fn boolean(v: bool) -> String {
    format!("<value><boolean>{}</boolean></value>", u8::from(v))
}

pub fn member(name: &str, value: &str) -> String {
    format!("<member><name>{}</name>{}</member>", name, value)
}

pub fn structure(members: &[String]) -> String {
    format!("<value><struct>{}</struct></value>", members.concat())
}

pub fn array(values: &[String]) -> String {
    format!("<value><array><data>{}</data></array></value>", values.concat())
}

pub fn response(value: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<methodResponse>\n  <params>\n    <param>\n      {}\n    </param>\n  </params>\n</methodResponse>\n",
        value
    )
}

/// A struct response with `status` first, then `members`
pub fn status_response(status: &str, members: &[String]) -> String {
    let mut all = vec![member("status", &string(status))];
    all.extend_from_slice(members);
    response(&structure(&all))
}

pub fn ok_response(members: &[String]) -> String {
    status_response("200 OK", members)
}

/// One SearchSubtitles record
pub fn subtitle_record(id: u64, lang: &str, iso: &str, downloads: u64) -> String {
    structure(&[
        member("IDSubtitleFile", &string(&id.to_string())),
        member("SubFileName", &string(&format!("movie.{}.{}.srt", lang, id))),
        member("SubLanguageID", &string(lang)),
        member("ISO639", &string(iso)),
        member("LanguageName", &string("Language")),
        member("SubRating", &string("7.5")),
        member("SubHD", &string("0")),
        member("SubHearingImpaired", &string("1")),
        member("SubDownloadsCnt", &string(&downloads.to_string())),
        member("MovieFPS", &string("25.000")),
        member("MatchedBy", &string("tag")),
    ])
}

// =============================================================================
// Mock server
// =============================================================================

pub fn method(name: &str) -> Matcher {
    Matcher::Regex(format!("<methodName>{}</methodName>", name))
}

/// Match a call to `name` whose body also contains `fragment`
pub fn method_with(name: &str, fragment: &str) -> Matcher {
    Matcher::AllOf(vec![method(name), Matcher::Regex(regex_escape(fragment))])
}

fn regex_escape(s: &str) -> String {
    s.chars()
        .flat_map(|c| {
            let escaped = "\\.+*?()|[]{}^$".contains(c);
            escaped.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect()
}

pub async fn mock_call(server: &mut ServerGuard, matcher: Matcher, body: String) -> Mock {
    server
        .mock("POST", RPC_PATH)
        .match_body(matcher)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(body)
        .create_async()
        .await
}

/// Like [`mock_call`], asserting exactly `hits` calls
pub async fn mock_call_times(
    server: &mut ServerGuard,
    matcher: Matcher,
    body: String,
    hits: usize,
) -> Mock {
    server
        .mock("POST", RPC_PATH)
        .match_body(matcher)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

/// Like [`mock_call`], but the body only arrives after `delay`
pub async fn mock_slow_call(
    server: &mut ServerGuard,
    matcher: Matcher,
    body: String,
    delay: Duration,
) -> Mock {
    server
        .mock("POST", RPC_PATH)
        .match_body(matcher)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_chunked_body(move |w| {
            std::thread::sleep(delay);
            w.write_all(body.as_bytes())
        })
        .create_async()
        .await
}

pub async fn mock_server_info(server: &mut ServerGuard) -> Mock {
    mock_call(
        server,
        method("ServerInfo"),
        response(&structure(&[
            member("application", &string("OpenSuber v0.2")),
            member("xmlrpc_version", &string("0.1")),
            member("users_online_total", &int(4321)),
            member("subs_subtitle_files", &int(2_000_000)),
            member("movies_total", &int(150_000)),
        ])),
    )
    .await
}

pub fn login_response(languages: &str) -> String {
    login_response_with_token(languages, TOKEN)
}

pub fn login_response_with_token(languages: &str, token: &str) -> String {
    ok_response(&[
        member("token", &string(token)),
        member(
            "data",
            &structure(&[member("UserPreferedLanguages", &string(languages))]),
        ),
        member("seconds", &string("0.01")),
    ])
}

pub async fn mock_login(server: &mut ServerGuard, languages: &str) -> Mock {
    mock_call(server, method("LogIn"), login_response(languages)).await
}

pub fn session_config(server: &Server) -> SessionConfig {
    SessionConfig {
        server_url: format!("{}{}", server.url(), RPC_PATH),
        request_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

pub async fn new_server() -> ServerGuard {
    Server::new_async().await
}

/// Handshake and log in with `languages` as the account preference
pub async fn logged_in_session(server: &mut ServerGuard, languages: &str) -> SessionManager {
    mock_server_info(server).await;
    mock_login(server, languages).await;
    let session = SessionManager::connect(session_config(server)).await.unwrap();
    session
        .login(&Credentials::new("user", "password"))
        .await
        .unwrap();
    session
}

// =============================================================================
// Test files
// =============================================================================

/// Deterministic pseudo-random bytes
pub fn lcg_bytes(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x5EED;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// Write a video of `len` pseudo-random bytes at `dir/folder/name`
pub fn write_video(dir: &Path, folder: &str, name: &str, len: usize) -> PathBuf {
    let folder = dir.join(folder);
    std::fs::create_dir_all(&folder).unwrap();
    let path = folder.join(name);
    std::fs::write(&path, lcg_bytes(len)).unwrap();
    path
}
