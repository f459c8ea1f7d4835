//! `test-utils` is used for testing in both `mobilint-lib` and `mobilint-bin`.
//! This crate does not depend on `mobilint-lib` or `mobilint-bin`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

pub mod dir_builder;

/// A chat completion response whose single message has the given content
#[macro_export]
macro_rules! chat_completion {
    ($content:expr) => {
        wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": $content } }]
        }))
    };
}

/// Create a mock chat completion server, which answers every
/// `POST /chat/completions` with the given message content.
///
/// `mock_chat_server!(status = 429)` answers every `POST` with that status
/// instead.
#[macro_export]
macro_rules! mock_chat_server {
    (status = $status:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new($status))
            .mount(&mock_server)
            .await;
        mock_server
    }};
    ($content:expr) => {{
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with($crate::chat_completion!($content))
            .mount(&mock_server)
            .await;
        mock_server
    }};
}

/// Get the root path of the project.
#[macro_export]
macro_rules! root_path {
    () => {
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .to_path_buf()
    };
}

/// Gets the "main" binary name (e.g. `mobilint`)
#[macro_export]
macro_rules! main_command {
    () => {
        Command::cargo_bin("mobilint").expect("Couldn't find the mobilint binary")
    };
}
