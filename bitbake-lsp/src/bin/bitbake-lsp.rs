use std::process::ExitCode;

use bitbake_lsp::features::embedded::GET_EMBEDDED_LANGUAGE_DOC_INFOS;
use bitbake_lsp::BitbakeLanguageServer;
use tokio::io::{stdin, stdout};
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let stdin = stdin();
    let stdout = stdout();
    let (service, socket) = LspService::build(BitbakeLanguageServer::new)
        .custom_method(
            GET_EMBEDDED_LANGUAGE_DOC_INFOS,
            BitbakeLanguageServer::embedded_language_doc_info,
        )
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;
    ExitCode::SUCCESS
}
