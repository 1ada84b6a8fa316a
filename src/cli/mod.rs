//! CLI 모듈
//!
//! bharat-connect CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::content::{get_data_dir, ContentKind, ContentStore, FeedHarvester, HarvestConfig};
use crate::coordinator::{Coordinator, CoordinatorConfig, CheckpointManager, DiscoveryResults, new_run_id};
use crate::diksha::{DikshaConfig, DikshaDiscoveryAgent, SystematicPlan};
use crate::llm::{has_api_key, GeminiClient, LlmProvider, RetryBudget};
use crate::rag::Strategy;
use crate::scraper::discover::{DiscoveryConfig, FeedDiscoverer};
use crate::scraper::WebScraper;
use crate::search::{CrossLanguageSearch, Language, SearchFilters};
use crate::validator::{
    AiValidator, FeedValidator, LightweightValidator, ValidationStore, ValidatorConfig,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "bharat-connect")]
#[command(version, about = "다국어 피드 탐색 및 교차 언어 검색", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 검색 대상 콘텐츠 종류
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum KindArg {
    All,
    News,
    Education,
}

impl KindArg {
    fn to_kind(self) -> Option<ContentKind> {
        match self {
            KindArg::All => None,
            KindArg::News => Some(ContentKind::Rss),
            KindArg::Education => Some(ContentKind::Diksha),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 피드 탐색 실행 (Phase 1 → RAG 반복 → 최종 분석)
    Discover {
        /// 후보 URL 생성 기준 URL
        #[arg(long, default_value = "https://pib.gov.in/RssMain.aspx")]
        base_url: String,

        /// Phase 1 시작 페이지
        #[arg(long, default_value = "https://www.pib.gov.in/ViewRss.aspx")]
        start_url: String,

        /// 최대 반복 수 (Phase 2는 1..max-iterations)
        #[arg(long, default_value = "5")]
        max_iterations: usize,

        /// 최소 품질 점수 (0-100)
        #[arg(long, default_value = "60")]
        min_quality: u32,

        /// 반복당 후보 수
        #[arg(long, default_value = "50")]
        candidates: usize,

        /// 생성 전략 (suggested, systematic, hybrid)
        #[arg(long, default_value = "hybrid")]
        strategy: Strategy,

        /// Phase 1 최대 페이지 수
        #[arg(long, default_value = "500")]
        max_pages: usize,

        /// 실행 ID (같은 ID면 Phase 1 체크포인트를 재사용)
        #[arg(long)]
        run_id: Option<String>,

        /// 체크포인트 디렉토리
        #[arg(long, default_value = "./checkpoints")]
        checkpoint_dir: PathBuf,

        /// 체크포인트가 있어도 Phase 1 다시 실행
        #[arg(long)]
        force_phase1: bool,

        /// 결과 JSON 파일
        #[arg(short, long, default_value = "discovery_results.json")]
        output: PathBuf,
    },

    /// 체크포인트 목록
    Checkpoints {
        /// 체크포인트 디렉토리
        #[arg(long, default_value = "./checkpoints")]
        dir: PathBuf,

        /// 최근 N개만 남기고 정리
        #[arg(long)]
        cleanup: Option<usize>,
    },

    /// 피드 URL 검증
    Validate {
        /// 검증할 URL
        urls: Vec<String>,

        /// 한 줄에 하나씩 URL이 적힌 파일
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 검증 출처 태그
        #[arg(long, default_value = "cli")]
        source: String,

        /// 최소 품질 점수
        #[arg(long, default_value = "60")]
        min_quality: u32,

        /// LLM 없이 가벼운 검증만
        #[arg(long)]
        lightweight: bool,
    },

    /// 검증 기록 조회
    Reports {
        /// 특정 URL의 기록만
        #[arg(short, long)]
        url: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// DIKSHA 교육 콘텐츠 탐색
    Diksha {
        /// 보드 (쉼표 구분, 기본: CBSE,NCERT)
        #[arg(long, value_delimiter = ',')]
        boards: Vec<String>,

        /// 학년 (쉼표 구분, 기본: Class 1..12)
        #[arg(long, value_delimiter = ',')]
        grades: Vec<String>,

        /// 과목 (쉼표 구분)
        #[arg(long, value_delimiter = ',')]
        subjects: Vec<String>,

        /// 매체 언어 (쉼표 구분, 없으면 전체)
        #[arg(long, value_delimiter = ',')]
        mediums: Vec<String>,

        /// 조합당 최대 항목 수
        #[arg(long, default_value = "100")]
        items_per_combination: usize,

        /// 조합 체크포인트 디렉토리
        #[arg(long, default_value = "./checkpoints/diksha")]
        checkpoint_dir: PathBuf,

        /// JSON 내보내기 경로
        #[arg(long)]
        json: Option<PathBuf>,

        /// CSV 내보내기 경로
        #[arg(long)]
        csv: Option<PathBuf>,

        /// 콘텐츠 저장소에 적재하지 않음
        #[arg(long)]
        no_store: bool,
    },

    /// 검증된 피드의 항목을 콘텐츠 저장소로 수집
    Harvest {
        /// 수집할 피드 URL (없으면 검증 기록의 유효 피드)
        urls: Vec<String>,

        /// discover 결과 JSON에서 피드 목록 읽기
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// 동시 요청 수
        #[arg(long, default_value = "4")]
        concurrency: usize,

        /// 피드당 최대 항목 수
        #[arg(long, default_value = "50")]
        max_items: usize,
    },

    /// 교차 언어 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 사용자 언어 (이름 또는 코드)
        #[arg(short = 'L', long, default_value = "English")]
        language: Language,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// 콘텐츠 종류
        #[arg(short, long, value_enum, default_value = "all")]
        kind: KindArg,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Discover {
            base_url,
            start_url,
            max_iterations,
            min_quality,
            candidates,
            strategy,
            max_pages,
            run_id,
            checkpoint_dir,
            force_phase1,
            output,
        } => {
            let config = CoordinatorConfig {
                base_url,
                start_url,
                max_iterations,
                min_quality_score: min_quality,
                candidates_per_iteration: candidates,
                strategy,
                max_pages,
                checkpoint_dir,
                run_id: run_id.unwrap_or_else(new_run_id),
            };
            cmd_discover(config, force_phase1, &output).await
        }
        Commands::Checkpoints { dir, cleanup } => cmd_checkpoints(&dir, cleanup),
        Commands::Validate {
            urls,
            file,
            source,
            min_quality,
            lightweight,
        } => cmd_validate(urls, file, &source, min_quality, lightweight).await,
        Commands::Reports { url, limit } => cmd_reports(url, limit),
        Commands::Diksha {
            boards,
            grades,
            subjects,
            mediums,
            items_per_combination,
            checkpoint_dir,
            json,
            csv,
            no_store,
        } => {
            let plan = SystematicPlan {
                boards,
                grades,
                subjects,
                mediums,
                items_per_combination,
            };
            cmd_diksha(plan, checkpoint_dir, json, csv, !no_store).await
        }
        Commands::Harvest {
            urls,
            results,
            concurrency,
            max_items,
        } => cmd_harvest(urls, results, concurrency, max_items).await,
        Commands::Search {
            query,
            language,
            limit,
            kind,
        } => cmd_search(&query, language, limit, kind).await,
        Commands::Status => cmd_status(),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// API 키가 있으면 Gemini 클라이언트
fn optional_llm() -> Result<Option<Arc<dyn LlmProvider>>> {
    if !has_api_key() {
        return Ok(None);
    }
    let client = GeminiClient::from_env().context("Gemini 클라이언트 생성 실패")?;
    Ok(Some(Arc::new(client)))
}

/// LLM이 있으면 AI 검증기, 없으면 경량 검증기
fn build_validator(llm: Option<Arc<dyn LlmProvider>>, min_quality: u32) -> Result<Box<dyn FeedValidator>> {
    let config = ValidatorConfig {
        min_quality_score: min_quality,
        ..Default::default()
    };
    let store = ValidationStore::open_default().context("ValidationStore 열기 실패")?;

    match llm {
        Some(llm) => Ok(Box::new(AiValidator::new(llm, config, Some(store))?)),
        None => Ok(Box::new(LightweightValidator::new(config, Some(store))?)),
    }
}

/// 탐색 명령어 (discover)
async fn cmd_discover(config: CoordinatorConfig, force_phase1: bool, output: &Path) -> Result<()> {
    let llm = optional_llm()?;
    if llm.is_none() {
        println!("[!] API 키 미설정: 경량 검증기를 사용하고 RAG 반복을 건너뜁니다");
    }

    println!("[*] 실행 ID: {}", config.run_id);
    println!("[*] 시작 페이지: {}", config.start_url);

    let budget = RetryBudget::default();
    let discoverer = FeedDiscoverer::new(
        WebScraper::new().context("WebScraper 생성 실패")?,
        llm.clone(),
        DiscoveryConfig {
            max_pages: config.max_pages,
            budget: budget.clone(),
            ..Default::default()
        },
    );
    let validator = build_validator(llm.clone(), config.min_quality_score)?;
    let checkpoint_dir = config.checkpoint_dir.clone();

    let mut coordinator = Coordinator::new(config, discoverer, validator, llm, budget)?;
    let results = match coordinator.execute(force_phase1).await {
        Ok(results) => results,
        Err(e) => {
            println!("[!] 탐색 실패: {:#}", e);
            println!("    같은 --run-id로 다시 실행하면 Phase 1 체크포인트부터 이어집니다");
            println!("    실행 ID: {}", coordinator.run_id());
            print_checkpoint_list(&checkpoint_dir, 5);
            return Err(e);
        }
    };

    results.save(output).context("결과 저장 실패")?;
    print_results(&results);
    println!("\n[OK] 결과 저장: {}", output.display());
    Ok(())
}

fn print_results(results: &DiscoveryResults) {
    let summary = &results.summary;
    let analysis = &results.analysis;

    println!("\n[OK] 탐색 완료 ({:.1}초)", results.metadata.duration_seconds);
    println!("     피드: {} 개", summary.total_unique_feeds);
    println!("     반복: {} 회", summary.total_iterations);
    println!("     테스트한 URL: {} 개", summary.total_urls_tested);
    println!("     성공률: {:.1}%", summary.overall_success_rate * 100.0);
    println!("     평균 품질: {:.1}/100", summary.avg_quality_score);

    let convergence = &analysis.convergence;
    println!(
        "\n[*] 수렴: {} ({}, 신뢰도 {:.0}%)",
        if convergence.converging { "CONVERGED" } else { "ACTIVE" },
        convergence.reason,
        convergence.confidence * 100.0
    );
    println!("    권장: {}", convergence.recommendation);

    let strategy = &analysis.strategy_recommendation;
    println!(
        "[*] 추천 전략: {} (성공률 {:.1}%, 효율 {:.1}%)",
        strategy.recommended,
        strategy.avg_success_rate * 100.0,
        strategy.avg_efficiency * 100.0
    );

    if !results.discovered_feeds.is_empty() {
        println!("\n[*] 상위 피드:");
        for (i, feed) in results.top_feeds(10).iter().enumerate() {
            let title = feed.title.as_deref().unwrap_or("Untitled");
            println!("  {:>2}. [{:>3}/100] {}", i + 1, feed.score, truncate_text(title, 50));
        }
        if results.discovered_feeds.len() > 10 {
            println!("      ... 외 {} 개", results.discovered_feeds.len() - 10);
        }
    }

    if !results.insights.is_empty() {
        println!("\n[*] 인사이트:");
        for insight in results.insights.iter().take(5) {
            println!("    - {}", insight);
        }
    }
}

fn print_checkpoint_list(dir: &Path, max: usize) {
    let Ok(manager) = CheckpointManager::new(dir) else { return };
    let Ok(files) = manager.list() else { return };

    if files.is_empty() {
        println!("[!] 체크포인트가 없습니다.");
        return;
    }

    println!("[OK] 체크포인트 ({} 개):", files.len());
    for path in files.iter().take(max) {
        let size = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        println!("  - {} ({})", name, format_bytes(size));
    }
    if files.len() > max {
        println!("    ... 외 {} 개", files.len() - max);
    }
}

/// 체크포인트 명령어 (checkpoints)
fn cmd_checkpoints(dir: &Path, cleanup: Option<usize>) -> Result<()> {
    if let Some(keep) = cleanup {
        let manager = CheckpointManager::new(dir)?;
        let removed = manager.cleanup(keep)?;
        println!("[OK] 오래된 체크포인트 {} 개 삭제", removed);
    }

    print_checkpoint_list(dir, 10);
    Ok(())
}

/// 검증 명령어 (validate)
async fn cmd_validate(
    mut urls: Vec<String>,
    file: Option<PathBuf>,
    source: &str,
    min_quality: u32,
    lightweight: bool,
) -> Result<()> {
    if let Some(path) = file {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
        urls.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    if urls.is_empty() {
        bail!("검증할 URL 또는 --file을 지정해야 합니다");
    }

    let llm = if lightweight { None } else { optional_llm()? };
    let mut validator = build_validator(llm, min_quality)?;
    println!("[*] {} 개 URL 검증 중 ({} 검증기)...\n", urls.len(), validator.name());

    let summary = validator.validate_batch(&urls, source, None).await;

    for report in summary.validated.iter().chain(summary.rejected.iter()) {
        let mark = if report.valid { "[OK]" } else { "[!]" };
        println!("{} [{:>3}/100] {}", mark, report.score, report.url);
        if let Some(ref title) = report.title {
            println!("     제목: {}", truncate_text(title, 60));
        }
        for error in &report.errors {
            println!("     오류: {}", error);
        }
        if !report.reasoning.is_empty() {
            println!("     근거: {}", truncate_text(&report.reasoning, 120));
        }
    }

    println!(
        "\n[*] 유효 {} / {} (성공률 {:.1}%)",
        summary.valid_count,
        summary.total_tested,
        summary.success_rate * 100.0
    );
    Ok(())
}

/// 검증 기록 명령어 (reports)
fn cmd_reports(url: Option<String>, limit: usize) -> Result<()> {
    let store = ValidationStore::open_default().context("ValidationStore 열기 실패")?;

    let mut rows = match url {
        Some(ref u) => store.fetch_by_url(u).context("기록 조회 실패")?,
        None => store.fetch_recent(limit).context("기록 조회 실패")?,
    };
    rows.truncate(limit);

    if rows.is_empty() {
        println!("[!] 검증 기록이 없습니다.");
        return Ok(());
    }

    println!("[OK] 검증 기록 ({} 건 / 전체 {} 건):\n", rows.len(), store.count()?);
    for row in rows {
        let report = &row.report;
        let mark = if report.valid { "OK" } else { "--" };
        println!(
            "  #{:<5} [{}] [{:>3}] {}",
            row.id, mark, report.score, report.url
        );
        println!(
            "         {} | {} | {}{}",
            report.timestamp.format("%Y-%m-%d %H:%M"),
            row.source,
            row.validator,
            row.run_id.map(|r| format!(" | run {}", r)).unwrap_or_default()
        );
    }
    Ok(())
}

/// DIKSHA 명령어 (diksha)
async fn cmd_diksha(
    plan: SystematicPlan,
    checkpoint_dir: PathBuf,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
    store: bool,
) -> Result<()> {
    let config = DikshaConfig {
        checkpoint_dir,
        ..Default::default()
    };
    let mut agent = DikshaDiscoveryAgent::new(config)?;

    println!("[*] DIKSHA 체계적 탐색 시작...");
    let report = agent.discover_systematic(plan).await?;

    println!(
        "[OK] 조합 {} 개 중 {} 개에서 {} 건 발견 (건너뜀 {} 개)",
        report.combinations_total,
        report.combinations_with_content,
        report.total_content,
        report.combinations_skipped
    );

    let stats = agent.stats();
    println!("     요청: {} 회", stats.total_requests);
    for (title, map) in [("언어", &stats.by_language), ("보드", &stats.by_board), ("과목", &stats.by_subject)] {
        let mut top: Vec<(&String, &usize)> = map.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1));
        let line: Vec<String> = top.iter().take(5).map(|(k, v)| format!("{} {}", k, v)).collect();
        if !line.is_empty() {
            println!("     {}: {}", title, line.join(", "));
        }
    }

    if let Some(path) = json {
        agent.export_json(&path)?;
        println!("[OK] JSON 내보내기: {}", path.display());
    }
    if let Some(path) = csv {
        let rows = agent.export_csv(&path)?;
        println!("[OK] CSV 내보내기: {} ({} 행)", path.display(), rows);
    }
    if store {
        let content = ContentStore::open_default().context("ContentStore 열기 실패")?;
        let stored = agent.store_into(&content)?;
        println!("[OK] 콘텐츠 저장소에 {} 건 저장", stored);
    }
    Ok(())
}

/// 수집 명령어 (harvest)
async fn cmd_harvest(
    mut urls: Vec<String>,
    results: Option<PathBuf>,
    concurrency: usize,
    max_items: usize,
) -> Result<()> {
    if let Some(path) = results {
        let results = DiscoveryResults::load(&path)?;
        urls.extend(results.discovered_feeds.into_iter().map(|r| r.url));
    }

    if urls.is_empty() {
        let store = ValidationStore::open_default().context("ValidationStore 열기 실패")?;
        urls = store
            .fetch_recent(1000)?
            .into_iter()
            .filter(|row| row.report.valid)
            .map(|row| row.report.url)
            .collect();
    }

    urls.sort();
    urls.dedup();
    if urls.is_empty() {
        println!("[!] 수집할 피드가 없습니다. 먼저 discover 또는 validate를 실행하세요.");
        return Ok(());
    }

    println!("[*] {} 개 피드 수집 중...", urls.len());
    let harvester = FeedHarvester::new(HarvestConfig {
        concurrency,
        max_items_per_feed: max_items,
        ..Default::default()
    })?;
    let store = ContentStore::open_default().context("ContentStore 열기 실패")?;
    let report = harvester.harvest(&urls, &store).await?;

    println!(
        "[OK] 항목 {} 건 저장 (성공 {} / 실패 {})",
        report.items_stored, report.feeds_ok, report.feeds_failed
    );
    for (url, error) in report.errors.iter().take(10) {
        println!("[!] {}: {}", url, truncate_text(error, 100));
    }
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(query: &str, language: Language, limit: usize, kind: KindArg) -> Result<()> {
    require_api_key()?;

    let store = ContentStore::open_default().context("ContentStore 열기 실패")?;
    let llm: Arc<dyn LlmProvider> = Arc::new(GeminiClient::from_env().context("Gemini 클라이언트 생성 실패")?);
    let search = CrossLanguageSearch::new(&store, llm, language);

    println!("[*] 검색 중: \"{}\" ({})\n", query, language.native_name());
    let filters = SearchFilters {
        limit,
        kind: kind.to_kind(),
    };
    let response = search.process_query(query, &filters).await?;

    if let Some(error) = response.error {
        println!("[!] {}", error);
        return Ok(());
    }

    println!(
        "[OK] 검색 결과 ({} 건{}):\n",
        response.results_count,
        if response.cross_language_used { ", 다른 언어 포함" } else { "" }
    );

    for (i, hit) in response.results.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, hit.content_type, hit.title);
        if hit.was_translated {
            println!("   원문 ({}): {}", hit.original_language, truncate_text(&hit.original_title, 80));
        }
        println!("   출처: {} | {}", hit.source, hit.date);
        println!("   URL: {}", hit.url);
        if hit.content_type == "education" {
            println!(
                "   보드: {} | 학년: {} | 과목: {}",
                hit.board.as_deref().unwrap_or("N/A"),
                hit.grade.as_deref().unwrap_or(""),
                hit.subject.as_deref().unwrap_or("")
            );
        }
        for line in hit.summary.lines() {
            println!("   {}", line);
        }
        println!();
    }
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status() -> Result<()> {
    println!("bharat-connect v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (경량 검증만 가능)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match ContentStore::open_default().and_then(|s| s.stats()) {
        Ok(stats) => {
            println!("[OK] 콘텐츠: {} 건", stats.total);
            for (kind, count) in &stats.by_kind {
                println!("     {}: {}", kind, count);
            }
            if !stats.by_language.is_empty() {
                let langs: Vec<String> = stats
                    .by_language
                    .iter()
                    .map(|(code, n)| format!("{} {}", code, n))
                    .collect();
                println!("     언어: {}", langs.join(", "));
            }
            if let Ok(meta) = std::fs::metadata(&stats.db_path) {
                println!("     DB 크기: {}", format_bytes(meta.len() as usize));
            }
        }
        Err(e) => println!("[!] ContentStore 열기 실패: {}", e),
    }

    match ValidationStore::open_default().and_then(|s| s.count()) {
        Ok(count) => println!("[OK] 검증 기록: {} 건", count),
        Err(e) => println!("[!] ValidationStore 열기 실패: {}", e),
    }

    Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("PIB English\nfeed", 20), "PIB English feed");
        assert_eq!(truncate_text("हिन्दी समाचार", 6), "हिन्दी...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_discover_args() {
        let cli = Cli::try_parse_from([
            "bharat-connect",
            "discover",
            "--strategy",
            "systematic",
            "--run-id",
            "7f08d392",
            "--max-iterations",
            "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Discover {
                strategy,
                run_id,
                max_iterations,
                ..
            } => {
                assert_eq!(strategy, Strategy::Systematic);
                assert_eq!(run_id.as_deref(), Some("7f08d392"));
                assert_eq!(max_iterations, 3);
            }
            _ => panic!("expected discover"),
        }
    }

    #[test]
    fn test_parse_search_and_diksha_args() {
        let cli = Cli::try_parse_from(["bharat-connect", "search", "बिजली", "-L", "hi", "--kind", "education"]).unwrap();
        match cli.command {
            Commands::Search { language, kind, .. } => {
                assert_eq!(language, Language::Hindi);
                assert_eq!(kind.to_kind(), Some(ContentKind::Diksha));
            }
            _ => panic!("expected search"),
        }

        let cli = Cli::try_parse_from(["bharat-connect", "diksha", "--boards", "CBSE,NCERT", "--mediums", "Hindi"]).unwrap();
        match cli.command {
            Commands::Diksha { boards, mediums, grades, .. } => {
                assert_eq!(boards, vec!["CBSE", "NCERT"]);
                assert_eq!(mediums, vec!["Hindi"]);
                assert!(grades.is_empty());
            }
            _ => panic!("expected diksha"),
        }
    }
}
