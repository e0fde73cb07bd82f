//! CLI 모듈
//!
//! knowledge-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::app::App;
use crate::chat::ChatRequest;
use crate::config::Config;
use crate::ingest::AddDocumentRequest;
use crate::knowledge::{Candidate, SearchBudget, StoreBackend, DEFAULT_DATASET};
use crate::query::QueryRequest;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "knowledge-rag")]
#[command(version, about = "사용자/데이터셋 단위 RAG 백엔드", long_about = None)]
pub struct Cli {
    /// 액세스 토큰
    #[arg(long, global = true, env = "RAG_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 데이터셋에 추가
    Ingest {
        /// 문서 제목
        #[arg(short, long, required_unless_present = "batch")]
        title: Option<String>,

        /// 문서 URL
        #[arg(short, long)]
        url: Option<String>,

        /// 본문 텍스트
        #[arg(short, long, conflicts_with = "file")]
        body: Option<String>,

        /// 본문 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// JSON 배열 파일 ([{title, url, body, dataset}])
        #[arg(long, conflicts_with_all = ["title", "body", "file"])]
        batch: Option<PathBuf>,

        /// 데이터셋 이름
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// 검색 결과를 근거로 응답 생성
    Query {
        /// 질의
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, conflicts_with = "max_words")]
        limit: Option<usize>,

        /// 누적 단어 수 예산
        #[arg(short = 'w', long)]
        max_words: Option<usize>,

        /// 데이터셋 이름
        #[arg(short, long)]
        dataset: Option<String>,

        /// 모델 override
        #[arg(short, long)]
        model: Option<String>,

        /// 질의/응답을 추가할 세션 ID
        #[arg(short, long)]
        session: Option<String>,
    },

    /// 검색만 수행
    Search {
        /// 질의
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, conflicts_with = "max_words")]
        limit: Option<usize>,

        /// 누적 단어 수 예산
        #[arg(short = 'w', long)]
        max_words: Option<usize>,

        /// 데이터셋 이름
        #[arg(short, long)]
        dataset: Option<String>,

        /// FTS5 키워드 검색 (임베딩 없음)
        #[arg(short, long, conflicts_with = "max_words")]
        keyword: bool,
    },

    /// 세션 대화
    Chat {
        /// 메시지
        query: String,

        /// 세션 ID (없으면 새로 생성)
        #[arg(short, long)]
        session: Option<String>,

        /// 모델 override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// 액세스 토큰 관리
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// 새 토큰 발급
    Issue {
        /// 사용자 ID
        #[arg(short, long)]
        user: i64,

        /// 유효 기간 (일)
        #[arg(long, default_value = "30")]
        days: i64,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("설정 로드 실패")?;
    let app = App::open(config).await.context("저장소 초기화 실패")?;
    let token = cli.token.as_deref();

    match cli.command {
        Commands::Ingest {
            title,
            url,
            body,
            file,
            batch,
            dataset,
        } => {
            let user_id = authenticate(&app, token).await?;
            match batch {
                Some(path) => cmd_ingest_batch(&app, user_id, &path, dataset).await,
                None => {
                    let body = read_body(body, file)?;
                    let request = AddDocumentRequest {
                        title: title.unwrap_or_default(),
                        url,
                        body,
                        dataset,
                    };
                    cmd_ingest(&app, user_id, request).await
                }
            }
        }
        Commands::Query {
            query,
            limit,
            max_words,
            dataset,
            model,
            session,
        } => {
            let user_id = authenticate(&app, token).await?;
            let request = QueryRequest {
                query,
                budget: budget_from(limit, max_words),
                dataset,
                model,
                session_id: session,
            };
            cmd_query(&app, user_id, request).await
        }
        Commands::Search {
            query,
            limit,
            max_words,
            dataset,
            keyword,
        } => {
            let user_id = authenticate(&app, token).await?;
            if keyword {
                cmd_keyword_search(&app, user_id, &query, dataset, limit).await
            } else {
                let request = QueryRequest {
                    budget: budget_from(limit, max_words),
                    dataset,
                    ..QueryRequest::new(query)
                };
                cmd_search(&app, user_id, request).await
            }
        }
        Commands::Chat {
            query,
            session,
            model,
        } => {
            let user_id = authenticate(&app, token).await?;
            let request = ChatRequest {
                query,
                session_id: session,
                model,
            };
            cmd_chat(&app, user_id, request).await
        }
        Commands::Token {
            command: TokenCommands::Issue { user, days },
        } => cmd_token_issue(&app, user, days).await,
        Commands::Status => cmd_status(&app).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 토큰 → 사용자 ID
async fn authenticate(app: &App, token: Option<&str>) -> Result<i64> {
    let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
        bail!(
            "액세스 토큰이 필요합니다.\n\n\
             설정 방법:\n  \
             export RAG_ACCESS_TOKEN=your-token\n  \
             또는 --token your-token\n\n\
             발급: knowledge-rag token issue --user <id>"
        );
    };

    app.authorizer
        .authorize(token)
        .await
        .context("유효하지 않은 액세스 토큰")
}

/// 문서 추가 명령어 (ingest)
async fn cmd_ingest(app: &App, user_id: i64, request: AddDocumentRequest) -> Result<()> {
    println!("[*] 임베딩 생성 및 문서 저장 중...");

    let dataset = request
        .dataset
        .clone()
        .unwrap_or_else(|| DEFAULT_DATASET.to_string());
    let doc = app
        .ingestor
        .add_document(user_id, request)
        .await
        .context("문서 추가 실패")?;

    println!("[OK] 문서가 추가되었습니다 (ID: {})", doc.id);
    println!("     데이터셋: {}", dataset);
    if let Some(ref url) = doc.url {
        println!("     URL: {}", url);
    }

    Ok(())
}

/// 일괄 추가 (JSON 배열)
async fn cmd_ingest_batch(
    app: &App,
    user_id: i64,
    path: &Path,
    dataset: Option<String>,
) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("파일 읽기 실패: {:?}", path))?;
    let mut requests: Vec<AddDocumentRequest> =
        serde_json::from_str(&raw).context("JSON 배열 파싱 실패")?;

    if requests.is_empty() {
        println!("[!] 추가할 문서가 없습니다.");
        return Ok(());
    }

    for request in requests.iter_mut() {
        if request.dataset.is_none() {
            request.dataset = dataset.clone();
        }
    }

    println!("[*] 일괄 추가: {} 문서", requests.len());
    let docs = app
        .ingestor
        .add_documents(user_id, requests)
        .await
        .context("일괄 추가 실패 (앞선 문서는 저장됨)")?;

    println!("[OK] 완료: {} 문서 추가", docs.len());
    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(app: &App, user_id: i64, request: QueryRequest) -> Result<()> {
    println!("[*] 질의 중: \"{}\"", request.query);

    let result = app
        .pipeline
        .answer(user_id, request)
        .await
        .context("질의 실패")?;

    println!();
    println!("{}", result.response);
    println!();

    if !result.citations.is_empty() {
        println!("[OK] 참조 문서 ({} 건):", result.citations.len());
        for candidate in &result.citations {
            println!(
                "  {}. #{} {}",
                candidate.rank,
                candidate.id(),
                truncate_text(&candidate.document.title, 60)
            );
        }
    }

    if let Some(ref session_id) = result.session_id {
        println!("     세션: {}", session_id);
    }

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(app: &App, user_id: i64, request: QueryRequest) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", request.query);

    let results = app
        .pipeline
        .search(user_id, request)
        .await
        .context("검색 실패")?;

    print_candidates(&results);
    Ok(())
}

/// 키워드 검색 (SQLite FTS5)
async fn cmd_keyword_search(
    app: &App,
    user_id: i64,
    query: &str,
    dataset: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    println!("[*] 키워드 검색 중: \"{}\"", query);

    let dataset = dataset.unwrap_or_else(|| DEFAULT_DATASET.to_string());
    let limit = limit.unwrap_or(app.config.result_limit);
    let hits = app
        .sqlite
        .keyword_search(query, &dataset, user_id, limit)
        .await
        .context("키워드 검색 실패")?;

    if hits.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [BM25: {:.4}] Doc #{}",
            i + 1,
            hit.bm25_score,
            hit.document.id
        );
        print_document(&hit.document.title, hit.document.url.as_deref(), &hit.document.body);
    }

    Ok(())
}

/// 채팅 명령어 (chat)
async fn cmd_chat(app: &App, user_id: i64, request: ChatRequest) -> Result<()> {
    let reply = app
        .chat
        .chat(user_id, request)
        .await
        .context("채팅 실패")?;

    println!("{}", reply.response);
    println!();
    println!("[OK] 세션: {}", reply.session_id);
    Ok(())
}

/// 토큰 발급 명령어 (token issue)
async fn cmd_token_issue(app: &App, user_id: i64, days: i64) -> Result<()> {
    if days <= 0 {
        bail!("--days는 1 이상이어야 합니다");
    }

    let token = app
        .authorizer
        .issue_token(user_id, chrono::Duration::days(days))
        .await
        .context("토큰 발급 실패")?;

    println!("[OK] 사용자 {} 토큰 발급 ({}일 유효)", user_id, days);
    println!("     {}", token);
    println!("     (이 토큰은 다시 표시되지 않습니다)");
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(app: &App) -> Result<()> {
    let config = &app.config;

    println!("knowledge-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 저장소 백엔드: {}", config.backend);
    println!(
        "[*] 모델: {} (임베딩: {}, {} 차원)",
        config.default_model, config.embedding_model, config.embedding_dimension
    );

    if config.llm_endpoint.is_empty() || config.embedding_endpoint.is_empty() {
        println!("[!] LLM 엔드포인트: 미설정");
        println!("    설정: export LLM_ENDPOINT=... LLM_EMBEDDING_ENDPOINT=...");
    } else {
        println!("[OK] LLM 엔드포인트: {}", config.llm_endpoint);
    }

    match app.sqlite.stats().await {
        Ok(stats) => {
            println!(
                "[OK] 문서: {} 건, 데이터셋: {} 개, 세션: {} 개",
                stats.document_count, stats.dataset_count, stats.session_count
            );
            println!("     총 본문: {}", format_bytes(stats.total_body_bytes));
        }
        Err(e) => {
            println!("[!] 통계 조회 실패: {}", e);
        }
    }

    if config.backend == StoreBackend::Lance {
        if let Some(ref lance) = app.lance {
            match lance.index().count().await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 벡터", count),
                Err(e) => tracing::debug!("Vector count failed: {}", e),
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// CLI 인자 → 검색 예산
fn budget_from(limit: Option<usize>, max_words: Option<usize>) -> Option<SearchBudget> {
    match (limit, max_words) {
        (Some(n), _) => Some(SearchBudget::Count(n)),
        (None, Some(max)) => Some(SearchBudget::Words(max)),
        (None, None) => None,
    }
}

/// 본문: --body 또는 --file
fn read_body(body: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (body, file) {
        (Some(body), _) => Ok(body),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("파일 읽기 실패: {:?}", path)),
        (None, None) => bail!("--body 또는 --file 중 하나를 지정해야 합니다"),
    }
}

fn print_candidates(results: &[Candidate]) {
    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return;
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());
    for candidate in results {
        println!(
            "{}. [거리: {:.4}] Doc #{}",
            candidate.rank,
            candidate.distance,
            candidate.id()
        );
        let doc = &candidate.document;
        print_document(&doc.title, doc.url.as_deref(), &doc.body);
    }
}

fn print_document(title: &str, url: Option<&str>, body: &str) {
    println!("   제목: {}", title);
    if let Some(url) = url {
        println!("   URL: {}", url);
    }
    println!("   내용: {}", truncate_text(body, 200));
    println!();
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
