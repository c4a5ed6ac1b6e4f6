use clap::{Args, Parser, Subcommand};
use novfmt::{
    EditOptions, MergeOptions, MetadataPatch, PatchField, Result, RewriteOptions, RewriteRule,
    RewriteScope, Settings, Volume, expand_list_files, load_rules, scan_directories, toc_links,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// 📚 novfmt - EPUB小说合并与改写工具
#[derive(Parser)]
#[command(name = "novfmt")]
#[command(about = "合并、改写与编辑EPUB小说")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认读取当前目录下的novfmt.yaml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 按顺序合并多本EPUB
    Merge(MergeArgs),
    /// 编辑元数据或替换导航文档
    EditMeta(EditArgs),
    /// 按规则查找替换文本
    Rewrite(RewriteArgs),
    /// 列出导航文档中的目录
    Toc {
        /// EPUB文件路径
        input: PathBuf,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 输出路径
        #[arg(default_value = novfmt::DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
}

#[derive(Args)]
struct MergeArgs {
    /// 输入EPUB，按给出的顺序合并
    inputs: Vec<PathBuf>,
    /// 输出路径
    #[arg(short, long, default_value = "merged.epub")]
    out: PathBuf,
    /// 覆盖合并后的标题
    #[arg(short, long)]
    title: Option<String>,
    /// 覆盖合并后的语言
    #[arg(long)]
    lang: Option<String>,
    /// 作者（可重复）
    #[arg(short, long = "creator")]
    creators: Vec<String>,
    /// 每行一个路径的列表文件（可重复）
    #[arg(long = "list")]
    lists: Vec<PathBuf>,
    /// 收集其中的EPUB文件的目录（可重复）
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,
}

#[derive(Args)]
struct EditArgs {
    /// EPUB文件路径
    input: PathBuf,
    /// 输出路径（默认原地修改）
    #[arg(short, long)]
    out: Option<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    lang: Option<String>,
    #[arg(long)]
    identifier: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// 作者（可重复，替换原有列表）
    #[arg(long = "creator")]
    creators: Vec<String>,
    /// JSON格式的元数据补丁，命令行参数优先
    #[arg(long)]
    meta_json: Option<PathBuf>,
    /// 导出元数据快照（JSON）
    #[arg(long)]
    dump_meta: Option<PathBuf>,
    /// 导出导航文档
    #[arg(long)]
    dump_nav: Option<PathBuf>,
    /// 用指定文件替换导航文档
    #[arg(long)]
    nav: Option<PathBuf>,
    /// 不更新dcterms:modified
    #[arg(long)]
    no_touch_modified: bool,
}

#[derive(Args)]
struct RewriteArgs {
    /// EPUB文件路径
    input: PathBuf,
    /// 输出路径（默认原地修改）
    #[arg(short, long)]
    out: Option<PathBuf>,
    /// JSON格式的规则文件
    #[arg(long)]
    rules: Option<PathBuf>,
    /// 单条规则：查找内容
    #[arg(long)]
    find: Option<String>,
    /// 单条规则：替换内容
    #[arg(long, default_value = "")]
    replace: String,
    /// 单条规则：按正则表达式查找
    #[arg(long)]
    regex: bool,
    /// 单条规则：忽略大小写
    #[arg(long)]
    ignore_case: bool,
    /// 单条规则：元素选择器（可重复）
    #[arg(long = "selector")]
    selectors: Vec<String>,
    /// 改写范围：body、metadata 或 both
    #[arg(long, default_value = "body")]
    scope: RewriteScope,
    /// 只统计匹配，不写入
    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ 错误: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "novfmt=debug" } else { "novfmt=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Command::InitConfig { path } = &cli.command {
        Settings::generate_default_config(path)?;
        println!("✅ 已生成配置文件: {}", path.display());
        return Ok(());
    }

    let settings = Settings::load(cli.config.as_deref())?;
    match cli.command {
        Command::Merge(args) => run_merge(args, &settings),
        Command::EditMeta(args) => run_edit(args, &settings),
        Command::Rewrite(args) => run_rewrite(args, &settings),
        Command::Toc { input } => run_toc(input),
        Command::InitConfig { .. } => Ok(()),
    }
}

fn run_merge(args: MergeArgs, settings: &Settings) -> Result<()> {
    let mut inputs = args.inputs;
    inputs.extend(expand_list_files(&args.lists)?);
    inputs.extend(scan_directories(&args.dirs)?);

    let options = MergeOptions {
        out_path: args.out,
        title: args.title.unwrap_or_default(),
        language: args.lang.unwrap_or_default(),
        creators: args.creators,
        nav_title: settings.nav_title.clone(),
        compression_level: settings.compression_level,
    };
    let summary = novfmt::merge(&inputs, &options)?;
    println!(
        "📚 已合并 {} 卷，共 {} 个章节 → {}",
        summary.volumes,
        summary.spine_items,
        summary.output.display()
    );
    Ok(())
}

fn run_edit(args: EditArgs, settings: &Settings) -> Result<()> {
    let file_patch = match &args.meta_json {
        Some(path) => MetadataPatch::from_file(path)?,
        None => MetadataPatch::default(),
    };
    let flags = MetadataPatch {
        title: PatchField::from_option(args.title),
        language: PatchField::from_option(args.lang),
        identifier: PatchField::from_option(args.identifier),
        description: PatchField::from_option(args.description),
        creators: if args.creators.is_empty() {
            PatchField::Absent
        } else {
            PatchField::Set(args.creators)
        },
    };

    let options = EditOptions {
        out_path: args.out,
        patch: file_patch.overlay(flags),
        nav_replace: args.nav,
        dump_meta: args.dump_meta,
        dump_nav: args.dump_nav,
        touch_modified: settings.touch_modified && !args.no_touch_modified,
        compression_level: settings.compression_level,
    };
    let outcome = novfmt::edit(&args.input, &options)?;
    match outcome.written {
        Some(path) => println!("✅ 已写入: {}", path.display()),
        None => println!("📖 未做修改"),
    }
    Ok(())
}

fn run_rewrite(args: RewriteArgs, settings: &Settings) -> Result<()> {
    let mut rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => Vec::new(),
    };
    if let Some(find) = args.find {
        rules.push(RewriteRule {
            find,
            replace: args.replace,
            regex: args.regex,
            ignore_case: args.ignore_case,
            selectors: args.selectors,
        });
    }

    let options = RewriteOptions {
        out_path: args.out,
        scope: args.scope,
        rules,
        dry_run: args.dry_run,
        compression_level: settings.compression_level,
    };
    let stats = novfmt::rewrite(&args.input, &options)?;
    let prefix = if args.dry_run { "🔍 (dry-run) " } else { "✏️  " };
    println!(
        "{}匹配 {} 处，涉及 {} 个文件",
        prefix, stats.match_count, stats.files_changed
    );
    Ok(())
}

fn run_toc(input: PathBuf) -> Result<()> {
    let volume = Volume::open(&input)?;
    let nav_path = volume.nav_path()?;
    let html = fs::read_to_string(&nav_path).map_err(|e| novfmt::EpubError::file(&nav_path, e))?;

    println!("🌳 {}", volume.package().metadata.title().unwrap_or("未命名"));
    for (i, link) in toc_links(&html).iter().enumerate() {
        println!("  {}. {} → {}", i + 1, link.label, link.href);
    }
    Ok(())
}
