//! 文本改写引擎
//!
//! 按规则查找替换XHTML正文和/或核心元数据中的文本。

pub mod rule;
pub mod text;
pub mod xhtml;

pub use rule::{CompiledRule, ElementSelector, RewriteRule, RewriteScope, compile_rules, load_rules, parse_selectors};
pub use xhtml::{FileRewrite, RuleState, rewrite_xhtml};

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::Metadata;
use crate::epub::volume::Volume;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 改写选项
#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// 输出路径，None表示原地覆盖
    pub out_path: Option<PathBuf>,
    pub scope: RewriteScope,
    pub rules: Vec<RewriteRule>,
    /// 只统计不写入
    pub dry_run: bool,
    pub compression_level: Option<i64>,
}

/// 改写统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub match_count: usize,
    pub files_changed: usize,
}

/// 对一本EPUB执行改写
///
/// 规则在打开文件之前编译，规则错误不会产生任何IO。
/// 没有文件变化或dry-run时不写任何内容。
///
/// # 参数
/// * `input` - 输入EPUB路径
/// * `options` - 改写选项
///
/// # 返回值
/// * `Result<RewriteStats>` - 匹配次数与变化的文件数
pub fn rewrite<P: AsRef<Path>>(input: P, options: &RewriteOptions) -> Result<RewriteStats> {
    let input = input.as_ref();
    let rules = compile_rules(&options.rules)?;
    let mut volume = Volume::open(input)?;
    let mut stats = RewriteStats::default();
    let mut metadata_changed = false;

    if options.scope.includes_metadata() {
        let applicable: Vec<&CompiledRule> = rules.iter().filter(|r| !r.has_selectors()).collect();
        let mut metadata = volume.package().metadata.clone();
        let matches = rewrite_metadata(&mut metadata, &applicable);
        stats.match_count += matches;
        if metadata != volume.package().metadata {
            stats.files_changed += 1;
            metadata_changed = true;
            debug!(matches, "元数据有变化");
            if !options.dry_run {
                volume.package_mut().metadata = metadata;
            }
        }
    }

    if options.scope.includes_body() {
        for item in volume.package().manifest.iter().filter(|item| item.is_xhtml()) {
            let path = volume.resolve(&item.href)?;
            let content = fs::read_to_string(&path).map_err(|e| EpubError::file(&path, e))?;
            let result = rewrite_xhtml(&content, &rules).map_err(|source| EpubError::ContentParseError {
                path: PathBuf::from(&item.href),
                source,
            })?;
            stats.match_count += result.match_count;
            if let Some(bytes) = result.content {
                stats.files_changed += 1;
                debug!(file = %item.href, matches = result.match_count, "正文有变化");
                if !options.dry_run {
                    fs::write(&path, bytes).map_err(|e| EpubError::file(&path, e))?;
                }
            }
        }
    }

    if options.dry_run || stats.files_changed == 0 {
        info!(
            input = %input.display(),
            matches = stats.match_count,
            files = stats.files_changed,
            dry_run = options.dry_run,
            "改写完成，未写入"
        );
        return Ok(stats);
    }

    if metadata_changed {
        volume.save_package()?;
    }
    let out = options.out_path.as_deref().unwrap_or(input);
    volume.repack(out, options.compression_level)?;
    info!(
        output = %out.display(),
        matches = stats.match_count,
        files = stats.files_changed,
        "改写完成"
    );
    Ok(stats)
}

/// 对核心元数据的每个值依次应用规则，返回匹配次数
fn rewrite_metadata(metadata: &mut Metadata, rules: &[&CompiledRule]) -> usize {
    if rules.is_empty() {
        return 0;
    }
    let mut total = 0;
    for list in metadata.core_lists_mut() {
        for entry in list.iter_mut() {
            let (value, count) = text::apply_rules(&entry.value, rules.iter().copied());
            total += count;
            entry.value = value;
        }
    }
    total
}
