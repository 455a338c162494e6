//! CLI 모듈
//!
//! pdf-qa CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{has_api_key, AppConfig, MODEL_OPTIONS};
use crate::document::{load_pdf_async, Document, RecursiveTextSplitter};
use crate::embedding::create_embedder;
use crate::llm::{create_llm, Role, TokenCallback};
use crate::router::{LlmClassifier, QueryMode, QueryOutcome, QueryResult, QueryRouter};
use crate::session::ChatSession;
use crate::tools::{ExactMatchTool, MatchOptions, MatchResult, QaResult, SemanticAnswerer, SemanticQaTool};

/// 출력 시 스니펫 최대 길이
const SNIPPET_DISPLAY_CHARS: usize = 200;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pdf-qa")]
#[command(version, about = "PDF 문서 질의응답 (정확 일치 카운팅 + 시맨틱 QA)", long_about = None)]
pub struct Cli {
    /// 디버그 로그 출력
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// 강제 처리 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// 정확 일치 카운팅
    Exact,
    /// 시맨틱 QA
    Semantic,
}

impl From<ModeArg> for QueryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Exact => QueryMode::ExactMatch,
            ModeArg::Semantic => QueryMode::SemanticQa,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF에 대해 질문 (자동 라우팅)
    Ask {
        /// PDF 파일 경로
        pdf: PathBuf,

        /// 질문
        question: String,

        /// 처리 모드 강제 지정
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// 사용할 모델 (기본: PDFQA_MODEL 또는 gpt-3.5-turbo)
        #[arg(long)]
        model: Option<String>,

        /// 시맨틱 검색 청크 수 (기본: PDFQA_TOP_K)
        #[arg(long)]
        top_k: Option<usize>,

        /// 답변을 토큰 단위로 출력
        #[arg(long)]
        stream: bool,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 검색어 등장 횟수 계산 (API 키 불필요)
    Count {
        /// PDF 파일 경로
        pdf: PathBuf,

        /// 검색어 (리터럴)
        term: String,

        /// 대소문자 구분
        #[arg(long)]
        case_sensitive: bool,

        /// 단어 단위 일치만
        #[arg(long)]
        whole_word: bool,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 질문의 라우팅 결정만 확인
    Route {
        /// 질문
        question: String,

        /// 사용할 모델
        #[arg(long)]
        model: Option<String>,
    },

    /// PDF와 대화형 세션
    Chat {
        /// PDF 파일 경로
        pdf: PathBuf,

        /// 사용할 모델
        #[arg(long)]
        model: Option<String>,

        /// 시맨틱 검색 청크 수 (기본: PDFQA_TOP_K)
        #[arg(long)]
        top_k: Option<usize>,

        /// 스트리밍 출력 끄기
        #[arg(long)]
        no_stream: bool,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env().context("설정 로드 실패")?;
    let config = apply_overrides(config, &cli.command)?;

    match cli.command {
        Commands::Ask {
            pdf,
            question,
            mode,
            model,
            stream,
            json,
            ..
        } => {
            let model = model.unwrap_or_else(|| config.model.clone());
            cmd_ask(&config, &pdf, &question, mode.map(QueryMode::from), &model, stream, json).await
        }
        Commands::Count {
            pdf,
            term,
            case_sensitive,
            whole_word,
            json,
        } => {
            let options = MatchOptions {
                case_sensitive,
                whole_word,
            };
            cmd_count(&pdf, &term, options, json).await
        }
        Commands::Route { question, model } => {
            let model = model.unwrap_or_else(|| config.model.clone());
            cmd_route(&config, &question, &model).await
        }
        Commands::Chat {
            pdf,
            model,
            no_stream,
            ..
        } => {
            let model = model.unwrap_or_else(|| config.model.clone());
            cmd_chat(&config, &pdf, &model, !no_stream).await
        }
        Commands::Status => cmd_status(&config).await,
    }
}

/// 명령줄 옵션으로 설정 덮어쓰기
fn apply_overrides(mut config: AppConfig, command: &Commands) -> Result<AppConfig> {
    let top_k = match command {
        Commands::Ask { top_k, .. } | Commands::Chat { top_k, .. } => *top_k,
        _ => None,
    };

    if let Some(top_k) = top_k {
        if top_k == 0 {
            bail!("--top-k must be at least 1");
        }
        config.top_k = top_k;
    }

    Ok(config)
}

// ============================================================================
// Router Construction
// ============================================================================

/// 인덱스 없이 라우팅만 할 때 사용하는 시맨틱 협력자
struct NoIndex;

#[async_trait]
impl SemanticAnswerer for NoIndex {
    async fn ask(&self, _question: &str, _on_token: Option<TokenCallback<'_>>) -> Result<QaResult> {
        bail!("No vector store available")
    }
}

/// 문서를 인덱싱하여 라우터 생성
async fn build_router(config: &AppConfig, document: &Document, model: &str) -> Result<QueryRouter> {
    let llm = create_llm(model, config)?;
    let embedder = Arc::new(create_embedder(config)?);
    let splitter = RecursiveTextSplitter::new(config.chunk_size, config.chunk_overlap)?;

    println!("[*] 문서 인덱싱 중: {}", document.name());
    let semantic = SemanticQaTool::from_document(document, &splitter, embedder, llm.clone())
        .await
        .context("문서 인덱싱 실패")?
        .with_top_k(config.top_k);
    println!("[OK] 인덱스 생성 완료: {} 청크", semantic.store().len());

    Ok(QueryRouter::new(
        Arc::new(semantic),
        Arc::new(LlmClassifier::new(llm)),
    ))
}

/// 인덱스 없는 라우터 생성
fn build_routing_only(config: &AppConfig, model: &str) -> Result<QueryRouter> {
    let llm = create_llm(model, config)?;
    Ok(QueryRouter::new(
        Arc::new(NoIndex),
        Arc::new(LlmClassifier::new(llm)),
    ))
}

async fn load_document(path: &Path) -> Result<Document> {
    println!("[*] PDF 로드 중: {}", path.display());
    let document = load_pdf_async(path).await.context("PDF 로드 실패")?;
    println!(
        "[OK] {} 페이지 ({})",
        document.page_count(),
        format_bytes(document.total_bytes())
    );
    Ok(document)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
///
/// 질문을 라우팅하여 정확 일치 또는 시맨틱 QA로 처리합니다.
async fn cmd_ask(
    config: &AppConfig,
    pdf: &Path,
    question: &str,
    force_mode: Option<QueryMode>,
    model: &str,
    stream: bool,
    json: bool,
) -> Result<()> {
    let document = load_document(pdf).await?;

    // 정확 일치로 고정되면 임베딩 인덱스가 필요 없음
    let router = if force_mode == Some(QueryMode::ExactMatch) {
        build_routing_only(config, model)?
    } else {
        build_router(config, &document, model).await?
    };

    let mut print_token = |token: &str| {
        print!("{}", token);
        let _ = std::io::stdout().flush();
    };
    let on_token: Option<TokenCallback<'_>> = if stream && !json {
        println!();
        Some(&mut print_token)
    } else {
        None
    };
    let streamed = on_token.is_some();

    let result = router
        .process_query(question, &document, force_mode, on_token)
        .await
        .context("질의 처리 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if streamed {
            println!();
        }
        print_result(&result, streamed);
    }

    Ok(())
}

/// 카운트 명령어 (count)
///
/// LLM 없이 검색어 등장 횟수만 계산합니다.
async fn cmd_count(pdf: &Path, term: &str, options: MatchOptions, json: bool) -> Result<()> {
    let document = load_document(pdf).await?;
    let result = ExactMatchTool::new().count_matches(&document, term, options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_matches(term, &result);
    }

    Ok(())
}

/// 라우팅 명령어 (route)
async fn cmd_route(config: &AppConfig, question: &str, model: &str) -> Result<()> {
    let router = build_routing_only(config, model)?;
    let decision = router.route(question, None).await;

    println!("[OK] 모드: {}", decision.mode);
    if let Some(term) = decision.search_term {
        println!("     검색어: \"{}\"", term);
    }

    Ok(())
}

/// 대화 명령어 (chat)
///
/// 한 문서에 대해 여러 질문을 이어서 처리합니다.
async fn cmd_chat(config: &AppConfig, pdf: &Path, model: &str, stream: bool) -> Result<()> {
    let document = load_document(pdf).await?;
    let router = build_router(config, &document, model).await?;
    let mut session = ChatSession::new(document.name(), model);

    println!();
    println!("[*] 대화 시작 (모델: {}, 세션: {})", model, session.id());
    println!("    명령어: :clear, :history, :exact <질문>, :semantic <질문>, :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (question, force_mode) = match parse_chat_input(line) {
            ChatInput::Quit => break,
            ChatInput::Clear => {
                session.clear();
                router.clear_chat_history().await;
                println!("[OK] 대화 기록을 지웠습니다");
                continue;
            }
            ChatInput::History => {
                print_history(&session);
                continue;
            }
            ChatInput::Query { question, mode } => (question, mode),
        };

        let mut print_token = |token: &str| {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        };
        let on_token: Option<TokenCallback<'_>> = if stream {
            Some(&mut print_token)
        } else {
            None
        };
        let streamed = on_token.is_some();

        match router
            .process_query(question, &document, force_mode, on_token)
            .await
        {
            Ok(result) => {
                if streamed {
                    println!();
                }
                print_result(&result, streamed);
                session.record_query(question, &result);
            }
            Err(e) => println!("[!] 오류: {:#}", e),
        }
    }

    println!("[*] 대화 종료 ({} 메시지)", session.len());
    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정과 API 키 상태를 확인합니다.
async fn cmd_status(config: &AppConfig) -> Result<()> {
    println!("pdf-qa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 모델: {}", config.model);
    println!("    선택 가능: {}", MODEL_OPTIONS.join(", "));
    println!("[*] 임베딩 모델: {}", config.embedding_model);
    println!(
        "[*] 청크: {} 문자 (오버랩 {}), 검색 {} 건",
        config.chunk_size, config.chunk_overlap, config.top_k
    );
    if !config.uses_openai() {
        println!("[*] Ollama 호스트: {}", config.ollama_host);
    }

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
        println!("    (count 명령어는 API 키 없이 사용 가능)");
    }

    Ok(())
}

// ============================================================================
// Chat Input
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum ChatInput<'a> {
    Quit,
    Clear,
    History,
    Query {
        question: &'a str,
        mode: Option<QueryMode>,
    },
}

fn parse_chat_input(line: &str) -> ChatInput<'_> {
    match line {
        ":quit" | ":q" | ":exit" => ChatInput::Quit,
        ":clear" => ChatInput::Clear,
        ":history" => ChatInput::History,
        _ => {
            if let Some(rest) = line.strip_prefix(":exact ") {
                ChatInput::Query {
                    question: rest.trim(),
                    mode: Some(QueryMode::ExactMatch),
                }
            } else if let Some(rest) = line.strip_prefix(":semantic ") {
                ChatInput::Query {
                    question: rest.trim(),
                    mode: Some(QueryMode::SemanticQa),
                }
            } else {
                ChatInput::Query {
                    question: line,
                    mode: None,
                }
            }
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn print_result(result: &QueryResult, streamed: bool) {
    match &result.result {
        QueryOutcome::ExactMatch(matches) => {
            println!("\n[OK] 정확 일치: {} 회", matches.count);
            print_match_pages(matches);
        }
        QueryOutcome::SemanticQa(qa) => {
            if !streamed {
                println!("\n{}", qa.answer);
            }
            if !qa.sources.is_empty() {
                println!("\n[*] 출처:");
                for source in &qa.sources {
                    println!(
                        "  - Page {}: {}",
                        source.page_number,
                        truncate_text(&source.text, SNIPPET_DISPLAY_CHARS)
                    );
                }
            }
        }
    }
}

fn print_matches(term: &str, result: &MatchResult) {
    if result.is_empty() {
        println!("\n[!] \"{}\" 일치 항목이 없습니다.", term);
        return;
    }

    println!(
        "\n[OK] \"{}\": {} 회 ({} 페이지)",
        term,
        result.count,
        result.matches.len()
    );
    print_match_pages(result);
}

fn print_match_pages(result: &MatchResult) {
    for page in &result.matches {
        println!("\n  Page {} ({} 회)", page.page_number, page.count);
        for snippet in &page.snippets {
            println!("    - {}", truncate_text(snippet, SNIPPET_DISPLAY_CHARS));
        }
    }
}

fn print_history(session: &ChatSession) {
    if session.is_empty() {
        println!("[!] 대화 기록이 없습니다.");
        return;
    }

    for message in session.messages() {
        let who = match message.role {
            Role::User => "You",
            Role::Assistant => "AI",
            Role::System => "System",
        };
        println!(
            "[{}] {}: {}",
            message.timestamp.format("%H:%M:%S"),
            who,
            truncate_text(&message.content, SNIPPET_DISPLAY_CHARS)
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

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
