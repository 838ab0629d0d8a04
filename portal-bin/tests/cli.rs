#[cfg(test)]
mod cli {
    use std::error::Error;
    use std::fs;

    use http::StatusCode;
    use predicates::str::contains;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tempfile::{TempDir, tempdir};
    use test_utils::{main_command, mock_server, received_requests};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Result<T> = std::result::Result<T, Box<dyn Error>>;

    /// Run the binary in an empty directory, so no `portal.toml` is picked up
    fn command(dir: &TempDir) -> assert_cmd::Command {
        let mut cmd = main_command!();
        cmd.current_dir(dir.path()).env_remove("RUST_LOG");
        cmd
    }

    fn responses(stdout: &[u8]) -> Result<Vec<Value>> {
        Ok(serde_json::from_slice(stdout)?)
    }

    #[tokio::test]
    async fn test_success() -> Result<()> {
        let mock_server = mock_server!(
            StatusCode::OK,
            set_body_json(json!({"benefits": ["tuition", "housing"]}))
        );
        let dir = tempdir()?;

        let output = command(&dir)
            .arg(format!("{}/benefits", mock_server.uri()))
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let responses = responses(&output)?;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["status"], 200);
        assert_eq!(responses[0]["data"]["benefits"][1], "housing");
        assert_eq!(responses[0]["remaining_requests"], 99);
        Ok(())
    }

    #[tokio::test]
    async fn test_base_url_and_order() -> Result<()> {
        let mock_server = MockServer::start().await;
        for id in 1..=4 {
            Mock::given(method("GET"))
                .and(path(format!("/v1/courses/{id}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id })))
                .mount(&mock_server)
                .await;
        }
        let dir = tempdir()?;

        let output = command(&dir)
            .arg("--base-url")
            .arg(format!("{}/v1/", mock_server.uri()))
            .arg("--concurrency")
            .arg("2")
            .args(["courses/1", "courses/2", "courses/3", "courses/4"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let ids: Vec<Value> = responses(&output)?
            .iter()
            .map(|r| r["data"]["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_request_exit_code() -> Result<()> {
        let mock_server = mock_server!(
            StatusCode::NOT_FOUND,
            set_body_json(json!({"message": "No such user", "code": "USER_NOT_FOUND"}))
        );
        let dir = tempdir()?;

        let output = command(&dir)
            .arg(format!("{}/users/42", mock_server.uri()))
            .assert()
            .failure()
            .code(2)
            .get_output()
            .stdout
            .clone();

        // 404 is not retried
        assert_eq!(received_requests!(mock_server), 1);
        let responses = responses(&output)?;
        assert_eq!(responses[0]["status"], 404);
        assert_eq!(responses[0]["error"]["code"], "USER_NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    async fn test_retry_attempts_flag() -> Result<()> {
        let mock_server = mock_server!(StatusCode::SERVICE_UNAVAILABLE);
        let dir = tempdir()?;

        command(&dir)
            .arg("--retry-attempts")
            .arg("2")
            .arg("--retry-delay")
            .arg("10ms")
            .arg(mock_server.uri())
            .assert()
            .code(2);

        assert_eq!(received_requests!(mock_server), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_headers_and_body() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/enrollments"))
            .and(header("x-portal-tenant", "achievement"))
            .and(header("x-content-type-options", "nosniff"))
            .and(body_json(json!({"course": "CS101"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"enrolled": true})))
            .expect(1)
            .mount(&mock_server)
            .await;
        let dir = tempdir()?;

        command(&dir)
            .args(["-X", "post"])
            .args(["-d", r#"{"course": "CS101"}"#])
            .args(["-H", "X-Portal-Tenant: achievement"])
            .arg(format!("{}/enrollments", mock_server.uri()))
            .assert()
            .success()
            .stdout(contains(r#""enrolled": true"#));
        Ok(())
    }

    #[tokio::test]
    async fn test_config_file_rate_limits() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK, set_body_json(json!({})));
        let dir = tempdir()?;
        fs::write(
            dir.path().join("portal.toml"),
            r#"
            concurrency = 1

            [rate_limits.api]
            max_requests = 1
            window = "1h"
            "#,
        )?;

        let output = command(&dir)
            .arg(format!("{}/a", mock_server.uri()))
            .arg(format!("{}/b", mock_server.uri()))
            .assert()
            .code(2)
            .get_output()
            .stdout
            .clone();

        let responses = responses(&output)?;
        assert_eq!(responses[0]["status"], 200);
        assert_eq!(responses[1]["status"], 429);
        assert_eq!(responses[1]["error"]["code"], "RATE_LIMIT_EXCEEDED");
        // The denied request never left the process
        assert_eq!(received_requests!(mock_server), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_get_is_cached() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK, set_body_json(json!({"n": 1})));
        let endpoint = format!("{}/static", mock_server.uri());
        let dir = tempdir()?;

        let output = command(&dir)
            .args(["--concurrency", "1"])
            .args([&endpoint, &endpoint])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let responses = responses(&output)?;
        assert_eq!(responses[0]["cached"], false);
        assert_eq!(responses[1]["cached"], true);
        assert_eq!(received_requests!(mock_server), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_cache_flag() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK, set_body_json(json!({"n": 1})));
        let endpoint = format!("{}/static", mock_server.uri());
        let dir = tempdir()?;

        command(&dir)
            .args(["--concurrency", "1", "--no-cache"])
            .args([&endpoint, &endpoint])
            .assert()
            .success();

        assert_eq!(received_requests!(mock_server), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_json() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK, set_body_json(json!({})));
        let dir = tempdir()?;

        let output = command(&dir)
            .args(["--stats", "--format", "json"])
            .arg(mock_server.uri())
            .assert()
            .success()
            .get_output()
            .stderr
            .clone();

        let stats: Value = serde_json::from_slice(&output)?;
        assert_eq!(stats["responses"]["total"], 1);
        assert_eq!(stats["responses"]["successful"], 1);
        assert_eq!(stats["caches"]["api_responses"]["size"], 1);
        assert_eq!(stats["remaining_requests"], 99);
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_compact() -> Result<()> {
        let mock_server = mock_server!(StatusCode::OK, set_body_json(json!({})));
        let dir = tempdir()?;

        command(&dir)
            .arg("--stats")
            .arg(mock_server.uri())
            .assert()
            .success()
            .stderr(contains("1 requests: 1 successful, 0 failed"))
            .stderr(contains("Requests left: 99"));
        Ok(())
    }

    #[tokio::test]
    async fn test_analytics_are_sent() -> Result<()> {
        let api = mock_server!(StatusCode::OK, set_body_json(json!({})));
        let analytics = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collect"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&analytics)
            .await;
        let dir = tempdir()?;

        command(&dir)
            .arg("--analytics")
            .arg(format!("{}/collect", analytics.uri()))
            .arg(api.uri())
            .assert()
            .success();

        let requests = analytics.received_requests().await.unwrap_or_default();
        let body: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(body["metrics"][0]["name"], "batch");
        assert_eq!(body["metrics"][1]["tags"]["endpoint"], api.uri());
        Ok(())
    }

    #[test]
    fn test_invalid_config_file() -> Result<()> {
        let dir = tempdir()?;
        let config = dir.path().join("broken.toml");
        fs::write(&config, "concurrency = \"many\"")?;

        command(&dir)
            .arg("--config")
            .arg(&config)
            .arg("https://api.example.edu/")
            .assert()
            .failure()
            .code(3);
        Ok(())
    }

    #[test]
    fn test_invalid_default_config_file() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("portal.toml"), "colour = true")?;

        command(&dir)
            .arg("https://api.example.edu/")
            .assert()
            .failure()
            .code(3);
        Ok(())
    }

    #[test]
    fn test_invalid_body() -> Result<()> {
        let dir = tempdir()?;

        command(&dir)
            .args(["-X", "post", "-d", "{oops"])
            .arg("https://api.example.edu/")
            .assert()
            .failure()
            .code(1)
            .stderr(contains("Request body is not valid JSON"));
        Ok(())
    }

    #[test]
    fn test_requires_endpoint() {
        let dir = tempdir().unwrap();
        command(&dir)
            .assert()
            .failure()
            .stderr(contains("<endpoints>"));
    }

    #[test]
    fn test_help() {
        let dir = tempdir().unwrap();
        command(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(contains("--base-url"))
            .stdout(contains("--retry-attempts"));
    }
}
