//! CLI Command Tests
//!
//! Tests for all CLI commands with a mocked OpenSubtitles backend.
//! Covers argument parsing, JSON output format and exit codes.

mod common;

// =============================================================================
// CLI Argument Parsing Tests
// =============================================================================

mod cli_parsing {
    use clap::Parser;
    use std::path::PathBuf;
    use subtle::cli::{Cli, Command, ExitCode as CliExitCode, SortKey};
    use subtle::models::{SortField, SortOrder};

    #[test]
    fn test_no_args_browses() {
        let cli = Cli::parse_from(["subtle"]);
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_browse_command() {
        let cli = Cli::parse_from(["subtle", "browse", "/media/movies"]);
        match cli.command {
            Some(Command::Browse(cmd)) => {
                assert_eq!(cmd.dir, Some(PathBuf::from("/media/movies")));
            }
            _ => panic!("Expected Browse command"),
        }

        let cli = Cli::parse_from(["subtle", "ls"]);
        assert!(matches!(cli.command, Some(Command::Browse(cmd)) if cmd.dir.is_none()));
    }

    #[test]
    fn test_search_command_defaults() {
        let cli = Cli::parse_from(["subtle", "search", "heat.mkv"]);
        match cli.command {
            Some(Command::Search(cmd)) => {
                assert_eq!(cmd.file, PathBuf::from("heat.mkv"));
                assert_eq!(cmd.limit, None);
                assert_eq!(cmd.sort, SortKey::Downloads);
                assert_eq!(cmd.order(), SortOrder::Descending);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_sort_keys() {
        for (arg, field) in [
            ("name", SortField::FileName),
            ("id", SortField::DownloadId),
            ("rating", SortField::Rating),
            ("downloads", SortField::DownloadCount),
            ("fps", SortField::Fps),
        ] {
            let cli = Cli::parse_from(["subtle", "search", "a.mkv", "--sort", arg]);
            match cli.command {
                Some(Command::Search(cmd)) => assert_eq!(SortField::from(cmd.sort), field),
                _ => panic!("Expected Search command"),
            }
        }
        assert!(Cli::try_parse_from(["subtle", "search", "a.mkv", "--sort", "size"]).is_err());
    }

    #[test]
    fn test_download_command() {
        let cli = Cli::parse_from(["subtle", "download", "heat.mkv", "--lang", "dut"]);
        match cli.command {
            Some(Command::Download(cmd)) => {
                assert_eq!(cmd.lang.as_deref(), Some("dut"));
                assert_eq!(cmd.id, None);
            }
            _ => panic!("Expected Download command"),
        }
    }

    #[test]
    fn test_missing_file_argument() {
        assert!(Cli::try_parse_from(["subtle", "search"]).is_err());
        assert!(Cli::try_parse_from(["subtle", "download"]).is_err());
        assert!(Cli::try_parse_from(["subtle", "hash"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["subtle", "hash", "a.mkv", "--json", "-q", "--verbose"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(cli.verbose);
    }

    #[test]
    fn test_command_aliases() {
        assert!(matches!(
            Cli::parse_from(["subtle", "h", "a.mkv"]).command,
            Some(Command::Hash(_))
        ));
        assert!(matches!(
            Cli::parse_from(["subtle", "i"]).command,
            Some(Command::Info(_))
        ));
        assert!(matches!(
            Cli::parse_from(["subtle", "s", "a.mkv"]).command,
            Some(Command::Search(_))
        ));
        assert!(matches!(
            Cli::parse_from(["subtle", "dl", "a.mkv"]).command,
            Some(Command::Download(_))
        ));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(CliExitCode::Success), 0);
        assert_eq!(i32::from(CliExitCode::Unreachable), 2);
        assert_eq!(i32::from(CliExitCode::NoSubtitles), 5);
        assert_eq!(i32::from(CliExitCode::DownloadFailed), 6);
    }
}

// =============================================================================
// JSON Output Tests
// =============================================================================

mod json_output {
    use subtle::cli::{DownloadResponse, ExitCode, HashResponse, JsonOutput};

    #[test]
    fn test_json_output_success() {
        let output = JsonOutput::success(HashResponse {
            file: "/m/heat.mkv".to_string(),
            size: 200000,
            hash: "ba808d2fb8ac8cd7".to_string(),
        });
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["data"]["hash"], "ba808d2fb8ac8cd7");
        assert_eq!(json["data"]["size"], 200000);
        assert!(json.get("error").is_none());
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_json_output_error() {
        let output = JsonOutput::<()>::error_msg("Login unsuccessful", ExitCode::LoginFailed);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["error"], "Login unsuccessful");
        assert_eq!(json["exit_code"], 4);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_download_response_format() {
        let response = DownloadResponse {
            status: "ok",
            subtitle_id: 1951976245,
            language: "eng".to_string(),
            path: "/m/heat.en.srt".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"subtitle_id\":1951976245"));
    }
}

// =============================================================================
// Command Handler Tests
// =============================================================================

mod handlers {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    use super::common::*;
    use subtle::cli::{
        BrowseCmd, DownloadCmd, ExitCode, HashCmd, InfoCmd, Output, SearchCmd, SortKey,
    };
    use subtle::commands;
    use subtle::config::Config;

    fn quiet_json() -> Output {
        Output {
            json: true,
            quiet: true,
        }
    }

    fn config_for(server: &mockito::Server) -> Config {
        Config {
            username: Some("user".to_string()),
            password: Some("password".to_string()),
            server_url: Some(format!("{}{}", server.url(), RPC_PATH)),
            request_timeout_secs: Some(5),
            ..Default::default()
        }
    }

    fn search_cmd(file: std::path::PathBuf) -> SearchCmd {
        SearchCmd {
            file,
            limit: None,
            sort: SortKey::Downloads,
            asc: false,
        }
    }

    #[tokio::test]
    async fn test_hash_missing_file() {
        let cmd = HashCmd {
            file: "/no/such/movie.mkv".into(),
        };
        assert_eq!(
            commands::hash_cmd(cmd, &quiet_json()).await,
            ExitCode::InvalidArgs
        );
    }

    #[tokio::test]
    async fn test_hash_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "x", "a.mkv", 200_000);
        assert_eq!(
            commands::hash_cmd(HashCmd { file }, &quiet_json()).await,
            ExitCode::Success
        );
    }

    #[tokio::test]
    async fn test_browse_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_video(dir.path(), "season1", "e01.mkv", 10);
        let cmd = BrowseCmd {
            dir: Some(dir.path().to_path_buf()),
        };
        assert_eq!(
            commands::browse_cmd(cmd, &quiet_json()).await,
            ExitCode::Success
        );

        let cmd = BrowseCmd {
            dir: Some(dir.path().join("missing")),
        };
        assert_eq!(
            commands::browse_cmd(cmd, &quiet_json()).await,
            ExitCode::InvalidArgs
        );
    }

    #[tokio::test]
    async fn test_info_unreachable() {
        let config = Config {
            server_url: Some("http://127.0.0.1:1/xml-rpc".to_string()),
            request_timeout_secs: Some(2),
            ..Default::default()
        };
        assert_eq!(
            commands::info_cmd(InfoCmd {}, &config, &quiet_json()).await,
            ExitCode::Unreachable
        );
    }

    #[tokio::test]
    async fn test_info_success() {
        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        assert_eq!(
            commands::info_cmd(InfoCmd {}, &config_for(&server), &quiet_json()).await,
            ExitCode::Success
        );
    }

    #[tokio::test]
    async fn test_search_login_failed() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "x", "a.mkv", 10);

        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        mock_call(
            &mut server,
            method("LogIn"),
            status_response("401 Unauthorized", &[]),
        )
        .await;

        let code = commands::search_cmd(search_cmd(file), &config_for(&server), &quiet_json()).await;
        assert_eq!(code, ExitCode::LoginFailed);
    }

    #[tokio::test]
    async fn test_search_no_subtitles_still_logs_out() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "x", "a.mkv", 10);

        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        mock_login(&mut server, "eng").await;
        mock_call(
            &mut server,
            method("SearchSubtitles"),
            ok_response(&[member("data", "<value><boolean>0</boolean></value>")]),
        )
        .await;
        let logout = mock_call_times(&mut server, method("LogOut"), ok_response(&[]), 1).await;

        let code = commands::search_cmd(search_cmd(file), &config_for(&server), &quiet_json()).await;

        logout.assert_async().await;
        assert_eq!(code, ExitCode::NoSubtitles);
    }

    #[tokio::test]
    async fn test_search_rejects_large_limit() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "x", "a.mkv", 10);

        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        mock_login(&mut server, "eng").await;
        mock_call(&mut server, method("LogOut"), ok_response(&[])).await;

        let mut cmd = search_cmd(file);
        cmd.limit = Some(501);
        let code = commands::search_cmd(cmd, &config_for(&server), &quiet_json()).await;
        assert_eq!(code, ExitCode::InvalidArgs);
    }

    #[tokio::test]
    async fn test_download_by_language() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "Heat", "Heat.1995.avi", 10);

        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        mock_login(&mut server, "eng,dut").await;
        mock_call(
            &mut server,
            method("SearchSubtitles"),
            ok_response(&[member(
                "data",
                &array(&[
                    subtitle_record(1, "eng", "en", 10),
                    subtitle_record(2, "dut", "nl", 5),
                    subtitle_record(3, "dut", "nl", 50),
                ]),
            )]),
        )
        .await;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"1\n00:00:01,000 --> 00:00:02,000\nHallo\n").unwrap();
        let payload = STANDARD.encode(encoder.finish().unwrap());
        let download = mock_call_times(
            &mut server,
            method_with("DownloadSubtitles", "<string>3</string>"),
            ok_response(&[member(
                "data",
                &array(&[structure(&[
                    member("idsubtitlefile", &string("3")),
                    member("data", &string(&payload)),
                ])]),
            )]),
            1,
        )
        .await;
        let logout = mock_call_times(&mut server, method("LogOut"), ok_response(&[]), 1).await;

        let cmd = DownloadCmd {
            file,
            id: None,
            lang: Some("dut".to_string()),
            limit: None,
        };
        let code = commands::download_cmd(cmd, &config_for(&server), &quiet_json()).await;

        download.assert_async().await;
        logout.assert_async().await;
        assert_eq!(code, ExitCode::Success);
        let saved = dir.path().join("Heat").join("Heat.1995.nl.srt");
        assert!(std::fs::read_to_string(saved).unwrap().contains("Hallo"));
    }

    #[tokio::test]
    async fn test_download_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_video(dir.path(), "Heat", "Heat.1995.avi", 10);

        let mut server = new_server().await;
        mock_server_info(&mut server).await;
        mock_login(&mut server, "eng").await;
        mock_call(
            &mut server,
            method("SearchSubtitles"),
            ok_response(&[member("data", &array(&[subtitle_record(1, "eng", "en", 10)]))]),
        )
        .await;
        let download =
            mock_call_times(&mut server, method("DownloadSubtitles"), ok_response(&[]), 0).await;
        mock_call(&mut server, method("LogOut"), ok_response(&[])).await;

        let cmd = DownloadCmd {
            file,
            id: Some(42),
            lang: None,
            limit: None,
        };
        let code = commands::download_cmd(cmd, &config_for(&server), &quiet_json()).await;

        download.assert_async().await;
        assert_eq!(code, ExitCode::NoSubtitles);
    }
}
