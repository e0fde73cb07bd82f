//! knowledge-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // .env는 인자 파싱 전에 (RAG_ACCESS_TOKEN 등)
    let dotenv = std::path::Path::new(knowledge_rag::config::DOTENV_PATH);
    if knowledge_rag::config::load_dotenv(dotenv)? {
        tracing::debug!("Loaded environment from {:?}", dotenv);
    }

    let cli = knowledge_rag::cli::Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(knowledge_rag::cli::run(cli))
}
