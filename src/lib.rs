pub mod epub;

// === 核心API重新导出 ===

/// 合并多本EPUB
pub use epub::{MergeOptions, MergeSummary, merge};

/// 按规则改写正文或元数据
pub use epub::{RewriteOptions, RewriteRule, RewriteScope, RewriteStats, load_rules, rewrite};

/// 编辑元数据与导航文档
pub use epub::{EditOptions, EditOutcome, MetadataPatch, MetadataSnapshot, PatchField, edit};

/// 错误处理
pub use epub::{EpubError, ErrorKind, Result};

/// 配置
pub use epub::{DEFAULT_CONFIG_PATH, Settings};

// === 底层组件（高级用法） ===

/// 已解压的EPUB
pub use epub::Volume;

/// 容器组件
pub use epub::{Container, RootFile};

/// OPF组件
pub use epub::{
    DcMeta,
    GuideReference,
    ManifestItem,
    MetaNode,
    Metadata,
    PackageDocument,
    Spine,
    SpineItem,
};

/// 导航组件
pub use epub::{NavLink, toc_links};

/// 输入收集
pub use epub::{expand_list_files, scan_directories};

// === 库信息 ===

/// novfmt库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// novfmt库的描述
pub const DESCRIPTION: &str = "合并、改写与编辑EPUB小说的工具库";

// === 便捷函数 ===

/// 快速打开EPUB文件
///
/// 这是 `Volume::open` 的便捷包装函数。
///
/// # 参数
/// * `path` - EPUB文件路径
///
/// # 返回值
/// * `Result<Volume>` - 已解压的EPUB
///
/// # 示例
///
/// ```rust,no_run
/// let volume = novfmt::open("book.epub")?;
/// println!("书名: {}", volume.package().metadata.title().unwrap_or_default());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Volume> {
    Volume::open(path)
}
