//! 애플리케이션 조립 - 설정 → 저장소/프로바이더/서비스
//!
//! 백엔드는 시작 시 한 번 선택합니다. 세션과 토큰은 항상 SQLite에 있습니다.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::auth::AccessTokenAuthorizer;
use crate::chat::ChatService;
use crate::config::Config;
use crate::ingest::Ingestor;
use crate::knowledge::{DocumentStore, LanceStore, SearchBudget, SqliteStore, StoreBackend};
use crate::llm::{CompletionProvider, EmbeddingProvider, OpenAiClient};
use crate::query::{QueryDefaults, QueryPipeline, Retriever};

/// 조립된 서비스 묶음
pub struct App {
    pub config: Config,
    /// 문서 메타데이터, 세션, 토큰
    pub sqlite: Arc<SqliteStore>,
    /// 선택된 문서 저장소
    pub store: Arc<dyn DocumentStore>,
    /// Lance 백엔드일 때만
    pub lance: Option<Arc<LanceStore>>,
    pub authorizer: AccessTokenAuthorizer,
    pub pipeline: QueryPipeline,
    pub ingestor: Ingestor,
    pub chat: ChatService,
}

impl App {
    /// OpenAI 호환 클라이언트로 조립
    pub async fn open(config: Config) -> Result<Self> {
        let client = Arc::new(OpenAiClient::from_config(&config)?);
        Self::with_providers(config, client.clone(), client).await
    }

    /// 임의의 프로바이더로 조립
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", config.data_dir))?;

        let sqlite = Arc::new(SqliteStore::open(&config.db_path(), config.embedding_dimension)?);

        let lance = match config.backend {
            StoreBackend::Sqlite => None,
            StoreBackend::Lance => {
                Some(Arc::new(LanceStore::open(sqlite.clone(), &config.lance_path()).await?))
            }
        };
        let store: Arc<dyn DocumentStore> = match lance {
            Some(ref lance) => lance.clone(),
            None => sqlite.clone(),
        };
        tracing::info!(
            "Store ready: {} backend, {} dimensions, data dir {:?}",
            store.backend(),
            store.dimension(),
            config.data_dir
        );

        let system_prompt = config.load_system_prompt()?;
        let defaults = QueryDefaults {
            answer_budget: SearchBudget::Words(config.word_budget),
            search_budget: SearchBudget::Count(config.result_limit),
        };

        let retriever = Retriever::new(embedder.clone(), store.clone());
        let pipeline = QueryPipeline::new(
            retriever,
            completion.clone(),
            sqlite.clone(),
            system_prompt.clone(),
            defaults,
        );
        let ingestor = Ingestor::new(embedder, store.clone())
            .with_embedding_model(Some(config.embedding_model.clone()));
        let chat = ChatService::new(completion, sqlite.clone(), system_prompt);
        let authorizer = AccessTokenAuthorizer::new(sqlite.clone());

        Ok(Self {
            config,
            sqlite,
            store,
            lance,
            authorizer,
            pipeline,
            ingestor,
            chat,
        })
    }
}
