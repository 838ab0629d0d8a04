//! `test-utils` is used for testing in both `portal-lib` and `portal-bin`.
//! This crate does not depend on `portal-lib` or `portal-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock web server, which responds with a predefined status to
/// requests of any method and path
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any()).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Create a mock web server that fails the first `$failures` requests with
/// `$failure` and answers every later request with `$success`
#[macro_export]
macro_rules! flaky_mock_server {
    ($failures:expr, $failure:expr, $success:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(http::StatusCode::from($failure)))
            .up_to_n_times($failures)
            .with_priority(1)
            .mount(&mock_server)
            .await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($success));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(template)
            .with_priority(2)
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Number of requests a mock server has received so far
#[macro_export]
macro_rules! received_requests {
    ($mock_server:expr) => {
        $mock_server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    };
}

/// Gets the "main" binary name (e.g. `portal`)
#[macro_export]
macro_rules! main_command {
    () => {
        assert_cmd::cargo::cargo_bin_cmd!("portal")
    };
}
