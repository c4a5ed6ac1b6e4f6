pub mod error;
pub mod archive;
pub mod container;
pub mod opf;
pub mod config;
pub mod volume;
pub mod nav;
pub mod merge;
pub mod rewrite;
pub mod edit;
pub mod discover;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出错误处理
pub use error::{EpubError, ErrorKind, Result};

// 重新导出容器相关
pub use container::{Container, RootFile};

// 重新导出配置
pub use config::{DEFAULT_CONFIG_PATH, Settings};

// 重新导出分卷模型
pub use volume::Volume;

// 重新导出OPF相关
pub use opf::{
    DcMeta,
    GuideReference,
    ManifestItem,
    MetaNode,
    Metadata,
    PackageDocument,
    Spine,
    SpineItem,
};

// 重新导出导航
pub use nav::{NavLink, toc_links};

// 重新导出三个操作
pub use merge::{MergeOptions, MergeSummary, merge};
pub use rewrite::{RewriteOptions, RewriteRule, RewriteScope, RewriteStats, load_rules, rewrite};
pub use edit::{EditOptions, EditOutcome, MetadataPatch, MetadataSnapshot, PatchField, edit};

// 重新导出输入收集
pub use discover::{expand_list_files, scan_directories};
