//! 合并模块
//!
//! 把多本EPUB按顺序合并为一本：每卷的资源放进独立的命名空间目录，
//! 清单ID加卷号前缀，脊柱按输入顺序拼接，并生成新的导航文档。

use crate::epub::archive;
use crate::epub::container::{CONTAINER_PATH, Container};
use crate::epub::error::{EpubError, Result};
use crate::epub::nav::{NavLink, render_nav};
use crate::epub::opf::{DcMeta, MODIFIED_PROPERTY, ManifestItem, Metadata, PackageDocument, XHTML_MEDIA_TYPE};
use crate::epub::volume::Volume;
use chrono::{SecondsFormat, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 合并后包文件在容器内的路径
pub const MERGED_PACKAGE_PATH: &str = "OEBPS/content.opf";

const NAV_ID: &str = "nav";
const NAV_HREF: &str = "nav.xhtml";

/// 合并选项
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub out_path: PathBuf,
    /// 非空时覆盖第一卷的标题
    pub title: String,
    /// 非空时覆盖第一卷的语言
    pub language: String,
    /// 非空时替换第一卷的作者列表
    pub creators: Vec<String>,
    /// 导航文档标题
    pub nav_title: String,
    pub compression_level: Option<i64>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            out_path: PathBuf::new(),
            title: String::new(),
            language: String::new(),
            creators: Vec::new(),
            nav_title: "Contents".to_string(),
            compression_level: None,
        }
    }
}

/// 合并结果摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub volumes: usize,
    pub manifest_items: usize,
    pub spine_items: usize,
}

/// 第 `sequence` 卷的命名空间目录名，序号宽度至少两位
pub fn volume_dir(sequence: usize, total: usize) -> String {
    let width = total.to_string().len().max(2);
    format!("v{:0width$}", sequence, width = width)
}

/// 加上卷号前缀的新ID
pub fn prefixed_id(sequence: usize, id: &str) -> String {
    format!("v{}-{}", sequence, id)
}

/// 合并多本EPUB
///
/// 参数检查在任何IO之前完成。所有内容先写入私有的临时目录，
/// 最后一次性打包到输出路径，失败时不会留下输出文件。
///
/// # 参数
/// * `inputs` - 按顺序排列的输入文件，至少两个
/// * `options` - 合并选项
///
/// # 返回值
/// * `Result<MergeSummary>` - 合并结果摘要
pub fn merge<P: AsRef<Path>>(inputs: &[P], options: &MergeOptions) -> Result<MergeSummary> {
    if inputs.len() < 2 {
        return Err(EpubError::InvalidInput("至少需要两个EPUB文件".to_string()));
    }
    if options.out_path.as_os_str().is_empty() {
        return Err(EpubError::InvalidInput("没有指定输出路径".to_string()));
    }

    let staging = tempfile::Builder::new().prefix("novfmt-merge-").tempdir()?;
    let oebps = staging.path().join("OEBPS");

    let mut package = PackageDocument {
        version: "3.0".to_string(),
        ..PackageDocument::default()
    };
    let mut links = Vec::with_capacity(inputs.len());
    let mut first_metadata: Option<Metadata> = None;

    for (index, input) in inputs.iter().enumerate() {
        let sequence = index + 1;
        let volume = Volume::open(input.as_ref())?;
        let dir = volume_dir(sequence, inputs.len());
        let mut ids = HashMap::new();

        for item in &volume.package().manifest {
            let mut merged = item.clone();
            merged.id = prefixed_id(sequence, &item.id);
            merged.fallback = item.fallback.as_deref().map(|id| prefixed_id(sequence, id));
            merged.media_overlay = item.media_overlay.as_deref().map(|id| prefixed_id(sequence, id));
            merged.remove_property("nav");

            if is_remote(&item.href) {
                debug!(href = %item.href, "远程资源，保留原链接");
            } else {
                let relative = volume.container_relative(&item.href)?;
                let dest = volume
                    .container_path(&item.href)?
                    .split('/')
                    .fold(oebps.join("Volumes").join(&dir), |path, segment| path.join(segment));
                copy_resource(&volume, &item.href, &dest)?;
                merged.href = format!("Volumes/{}/{}", dir, relative);
            }

            ids.insert(item.id.as_str(), merged.id.clone());
            package.manifest.push(merged);
        }

        let first_itemref = package.spine.itemrefs.len();
        for itemref in &volume.package().spine.itemrefs {
            let idref = ids.get(itemref.idref.as_str()).ok_or_else(|| {
                EpubError::OpfParseError(format!("脊柱引用了不存在的清单项: {}", itemref.idref))
            })?;
            let mut merged = itemref.clone();
            merged.idref = idref.clone();
            merged.id = itemref.id.as_deref().map(|id| prefixed_id(sequence, id));
            package.spine.itemrefs.push(merged);
        }

        let metadata = &volume.package().metadata;
        let label = match metadata.title().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Volume {}", sequence),
        };
        match package.entry_href(first_itemref) {
            Some(href) => links.push(NavLink::new(label, href)),
            None => warn!(volume = %volume.source().display(), "没有脊柱项，导航中跳过此卷"),
        }

        debug!(
            volume = %volume.source().display(),
            sequence,
            directory = %dir,
            manifest = volume.package().manifest.len(),
            spine = volume.package().spine.itemrefs.len(),
            "合并分卷"
        );

        if first_metadata.is_none() {
            first_metadata = Some(metadata.clone());
        }
    }

    package.metadata = merged_metadata(first_metadata.unwrap_or_default(), options);

    let nav = render_nav(&options.nav_title, package.metadata.language(), &links)?;
    write_file(&oebps.join(NAV_HREF), nav.as_bytes())?;
    package.manifest.insert(
        0,
        ManifestItem::with_properties(
            NAV_ID.to_string(),
            NAV_HREF.to_string(),
            XHTML_MEDIA_TYPE.to_string(),
            "nav".to_string(),
        ),
    );
    package.validate()?;

    write_file(&staging.path().join(MERGED_PACKAGE_PATH), package.to_xml()?.as_bytes())?;
    write_file(
        &staging.path().join(CONTAINER_PATH),
        Container::render(MERGED_PACKAGE_PATH).as_bytes(),
    )?;
    archive::pack(staging.path(), &options.out_path, options.compression_level)?;

    let summary = MergeSummary {
        output: options.out_path.clone(),
        volumes: inputs.len(),
        manifest_items: package.manifest.len(),
        spine_items: package.spine.itemrefs.len(),
    };
    info!(
        output = %summary.output.display(),
        volumes = summary.volumes,
        spine = summary.spine_items,
        "合并完成"
    );
    Ok(summary)
}

/// 以第一卷的元数据为基础应用覆盖项；标识符和描述不参与合并
fn merged_metadata(first: Metadata, options: &MergeOptions) -> Metadata {
    let mut metadata = Metadata::new();

    let title = options.title.trim();
    metadata.titles = if title.is_empty() {
        first.titles.into_iter().take(1).collect()
    } else {
        vec![DcMeta::new(title)]
    };

    let language = options.language.trim();
    metadata.languages = if language.is_empty() {
        first.languages.into_iter().take(1).collect()
    } else {
        vec![DcMeta::new(language)]
    };

    let creators: Vec<&str> = options
        .creators
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    metadata.creators = if creators.is_empty() {
        first.creators
    } else {
        creators.into_iter().map(DcMeta::new).collect()
    };

    metadata.set_property(
        MODIFIED_PROPERTY,
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    metadata
}

fn is_remote(href: &str) -> bool {
    href.contains("://")
}

fn copy_resource(volume: &Volume, href: &str, dest: &Path) -> Result<()> {
    let source = volume.resolve(href)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| EpubError::file(parent, e))?;
    }
    fs::copy(&source, dest).map_err(|e| EpubError::file(&source, e))?;
    Ok(())
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| EpubError::file(parent, e))?;
    }
    fs::write(path, content).map_err(|e| EpubError::file(path, e))
}
