//! 元数据与导航编辑模块
//!
//! 对单本EPUB应用元数据补丁、替换导航文档，或导出元数据快照和导航文件。

use crate::epub::error::{EpubError, Result};
use crate::epub::nav::check_well_formed;
use crate::epub::opf::{DcMeta, MODIFIED_PROPERTY, Metadata};
use crate::epub::volume::Volume;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 补丁字段的三种状态
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PatchField<T> {
    /// 保持不变
    #[default]
    Absent,
    /// 设为空
    Cleared,
    /// 替换为给定值
    Set(T),
}

/// 可以为空的补丁值
pub trait PatchValue {
    fn is_empty_value(&self) -> bool;
}

impl PatchValue for String {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl PatchValue for Vec<String> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T: PatchValue> PatchField<T> {
    /// 由可选值构造：None保持不变，空值清空
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            None => PatchField::Absent,
            Some(v) if v.is_empty_value() => PatchField::Cleared,
            Some(v) => PatchField::Set(v),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PatchField::Absent)
    }

    /// 非Absent时用 `other` 覆盖自身
    fn overlay(&mut self, other: PatchField<T>) {
        if !other.is_absent() {
            *self = other;
        }
    }
}

impl<'de, T> Deserialize<'de> for PatchField<T>
where
    T: Deserialize<'de> + PatchValue,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(PatchField::from_option)
    }
}

impl PatchField<String> {
    /// 需要写入的值：清空时为空字符串
    fn value(&self) -> Option<&str> {
        match self {
            PatchField::Absent => None,
            PatchField::Cleared => Some(""),
            PatchField::Set(v) => Some(v),
        }
    }
}

/// 元数据补丁
///
/// JSON中缺省或为 `null` 的字段保持不变，`""`/`[]` 设为空。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetadataPatch {
    pub title: PatchField<String>,
    pub language: PatchField<String>,
    pub identifier: PatchField<String>,
    pub description: PatchField<String>,
    pub creators: PatchField<Vec<String>>,
}

impl MetadataPatch {
    /// 从JSON文件读取补丁
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            EpubError::InvalidInput(format!("无法读取元数据文件 {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// 所有字段都保持不变
    pub fn is_empty(&self) -> bool {
        self.title.is_absent()
            && self.language.is_absent()
            && self.identifier.is_absent()
            && self.description.is_absent()
            && self.creators.is_absent()
    }

    /// 用另一个补丁中出现的字段覆盖本补丁
    pub fn overlay(mut self, other: MetadataPatch) -> Self {
        self.title.overlay(other.title);
        self.language.overlay(other.language);
        self.identifier.overlay(other.identifier);
        self.description.overlay(other.description);
        self.creators.overlay(other.creators);
        self
    }

    /// 把补丁应用到元数据，返回是否有字段被写入
    pub fn apply(&self, metadata: &mut Metadata) -> bool {
        if let Some(title) = self.title.value() {
            metadata.titles = vec![DcMeta::new(title)];
        }
        if let Some(language) = self.language.value() {
            metadata.languages = vec![DcMeta::new(language)];
        }
        if let Some(identifier) = self.identifier.value() {
            match metadata.identifiers.first_mut() {
                Some(first) => first.value = identifier.to_string(),
                None => metadata.identifiers.push(DcMeta::new(identifier)),
            }
        }
        if let Some(description) = self.description.value() {
            metadata.descriptions = vec![DcMeta::new(description)];
        }
        match &self.creators {
            PatchField::Absent => {}
            PatchField::Cleared => metadata.creators.clear(),
            PatchField::Set(names) => {
                metadata.creators = names.iter().map(DcMeta::new).collect();
            }
        }
        !self.is_empty()
    }
}

/// 元数据快照，导出时省略空字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<String>,
}

impl MetadataSnapshot {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let non_empty = |value: Option<&str>| value.filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            title: non_empty(metadata.title()),
            language: non_empty(metadata.language()),
            identifier: non_empty(metadata.identifier()),
            description: non_empty(metadata.description()),
            creators: metadata.creator_names(),
        }
    }

    /// 写出带缩进的JSON，自动创建父目录
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        ensure_parent(path)?;
        fs::write(path, json).map_err(|e| EpubError::file(path, e))
    }
}

/// 编辑选项
#[derive(Debug, Clone)]
pub struct EditOptions {
    /// 输出路径，None表示原地覆盖
    pub out_path: Option<PathBuf>,
    pub patch: MetadataPatch,
    /// 用于替换导航文档的文件
    pub nav_replace: Option<PathBuf>,
    /// 元数据快照导出路径
    pub dump_meta: Option<PathBuf>,
    /// 导航文档导出路径
    pub dump_nav: Option<PathBuf>,
    /// 有改动时更新 `dcterms:modified`
    pub touch_modified: bool,
    pub compression_level: Option<i64>,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            out_path: None,
            patch: MetadataPatch::default(),
            nav_replace: None,
            dump_meta: None,
            dump_nav: None,
            touch_modified: true,
            compression_level: None,
        }
    }
}

/// 编辑结果
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// 编辑前的元数据快照
    pub snapshot: MetadataSnapshot,
    /// 写回的文件，只读模式下为None
    pub written: Option<PathBuf>,
}

/// 编辑一本EPUB
///
/// 导出在修改之前进行，导出的是原始内容。没有补丁也没有导航替换时不写回任何内容。
///
/// # 参数
/// * `input` - 输入EPUB路径
/// * `options` - 编辑选项
///
/// # 返回值
/// * `Result<EditOutcome>` - 原始元数据快照与写回的路径
pub fn edit<P: AsRef<Path>>(input: P, options: &EditOptions) -> Result<EditOutcome> {
    let input = input.as_ref();
    let replacement = match &options.nav_replace {
        Some(path) => Some(fs::read_to_string(path).map_err(|e| {
            EpubError::InvalidInput(format!("无法读取导航文件 {}: {}", path.display(), e))
        })?),
        None => None,
    };

    let mut volume = Volume::open(input)?;
    let snapshot = MetadataSnapshot::from_metadata(&volume.package().metadata);

    if let Some(dest) = &options.dump_meta {
        snapshot.write_to(dest)?;
        debug!(dest = %dest.display(), "导出元数据");
    }
    if let Some(dest) = &options.dump_nav {
        let source = volume.nav_path()?;
        ensure_parent(dest)?;
        fs::copy(&source, dest).map_err(|e| EpubError::file(&source, e))?;
        debug!(dest = %dest.display(), "导出导航文档");
    }

    let meta_changed = options.patch.apply(&mut volume.package_mut().metadata);

    let nav_changed = match &replacement {
        Some(content) => {
            let target = volume.nav_path()?;
            check_well_formed(content)?;
            fs::write(&target, content).map_err(|e| EpubError::file(&target, e))?;
            true
        }
        None => false,
    };

    if !meta_changed && !nav_changed {
        return Ok(EditOutcome {
            snapshot,
            written: None,
        });
    }

    if options.touch_modified {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        volume.package_mut().metadata.set_property(MODIFIED_PROPERTY, stamp);
    }
    volume.save_package()?;

    let out = options.out_path.clone().unwrap_or_else(|| input.to_path_buf());
    volume.repack(&out, options.compression_level)?;
    info!(output = %out.display(), metadata = meta_changed, nav = nav_changed, "编辑完成");

    Ok(EditOutcome {
        snapshot,
        written: Some(out),
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| EpubError::file(parent, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::ErrorKind;
    use crate::epub::test_support::{BookFixture, write_book};
    use tempfile::tempdir;

    fn sample(dir: &Path) -> PathBuf {
        write_book(
            dir,
            &BookFixture::new("book", "原标题")
                .language("zh")
                .description("原简介")
                .chapter("c1", "<p>正文</p>"),
        )
    }

    #[test]
    fn test_patch_json_three_states() {
        let patch: MetadataPatch =
            serde_json::from_str(r#"{"title": "新标题", "language": null, "description": "", "creators": []}"#).unwrap();
        assert_eq!(patch.title, PatchField::Set("新标题".to_string()));
        assert_eq!(patch.language, PatchField::Absent);
        assert_eq!(patch.identifier, PatchField::Absent);
        assert_eq!(patch.description, PatchField::Cleared);
        assert_eq!(patch.creators, PatchField::Cleared);
        assert!(!patch.is_empty());
        assert!(serde_json::from_str::<MetadataPatch>("{}").unwrap().is_empty());
    }

    #[test]
    fn test_overlay_prefers_present_fields() {
        let file = MetadataPatch {
            title: PatchField::Set("文件标题".to_string()),
            language: PatchField::Set("en".to_string()),
            ..MetadataPatch::default()
        };
        let flags = MetadataPatch {
            title: PatchField::Set("命令行标题".to_string()),
            ..MetadataPatch::default()
        };
        let merged = file.overlay(flags);
        assert_eq!(merged.title, PatchField::Set("命令行标题".to_string()));
        assert_eq!(merged.language, PatchField::Set("en".to_string()));
    }

    #[test]
    fn test_apply_full_patch() {
        let dir = tempdir().unwrap();
        let path = sample(dir.path());
        let out = dir.path().join("out.epub");
        let options = EditOptions {
            out_path: Some(out.clone()),
            patch: MetadataPatch {
                title: PatchField::Set("新标题".to_string()),
                language: PatchField::Set("ja".to_string()),
                identifier: PatchField::Set("urn:isbn:123".to_string()),
                description: PatchField::Set("新简介".to_string()),
                creators: PatchField::Set(vec!["甲".to_string(), "乙".to_string()]),
            },
            ..EditOptions::default()
        };
        let outcome = edit(&path, &options).unwrap();
        assert_eq!(outcome.written, Some(out.clone()));
        assert_eq!(outcome.snapshot.title.as_deref(), Some("原标题"));

        let volume = Volume::open(&out).unwrap();
        let metadata = &volume.package().metadata;
        assert_eq!(metadata.title(), Some("新标题"));
        assert_eq!(metadata.language(), Some("ja"));
        assert_eq!(metadata.identifier(), Some("urn:isbn:123"));
        assert_eq!(metadata.identifiers[0].id.as_deref(), Some("BookId"));
        assert_eq!(metadata.description(), Some("新简介"));
        assert_eq!(metadata.creator_names(), vec!["甲".to_string(), "乙".to_string()]);
        let modified = metadata.modified().unwrap();
        assert_ne!(modified, "2020-01-01T00:00:00Z");
        assert!(modified.ends_with('Z'));
        assert_eq!(modified.len(), "2024-01-01T00:00:00Z".len());
    }

    #[test]
    fn test_description_only_leaves_other_fields() {
        let dir = tempdir().unwrap();
        let path = sample(dir.path());
        let before = Volume::open(&path).unwrap().package().metadata.clone();

        let options = EditOptions {
            patch: MetadataPatch {
                description: PatchField::Set("只改简介".to_string()),
                ..MetadataPatch::default()
            },
            touch_modified: false,
            ..EditOptions::default()
        };
        let outcome = edit(&path, &options).unwrap();
        assert_eq!(outcome.written.as_deref(), Some(path.as_path()));

        let after = Volume::open(&path).unwrap().package().metadata.clone();
        assert_eq!(after.description(), Some("只改简介"));
        assert_eq!(after.titles, before.titles);
        assert_eq!(after.languages, before.languages);
        assert_eq!(after.identifiers, before.identifiers);
        assert_eq!(after.creators, before.creators);
        assert_eq!(after.modified(), Some("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_cleared_fields() {
        let mut metadata = Metadata::new();
        metadata.titles.push(DcMeta::new("标题"));
        metadata.creators.push(DcMeta::new("作者"));
        let patch = MetadataPatch {
            title: PatchField::Cleared,
            creators: PatchField::Cleared,
            ..MetadataPatch::default()
        };
        assert!(patch.apply(&mut metadata));
        assert_eq!(metadata.titles, vec![DcMeta::new("")]);
        assert!(metadata.creators.is_empty());
    }

    #[test]
    fn test_read_only_dump() {
        let dir = tempdir().unwrap();
        let path = sample(dir.path());
        let before = fs::read(&path).unwrap();
        let meta_dump = dir.path().join("dump/meta.json");
        let nav_dump = dir.path().join("dump/nav/nav.xhtml");

        let options = EditOptions {
            dump_meta: Some(meta_dump.clone()),
            dump_nav: Some(nav_dump.clone()),
            ..EditOptions::default()
        };
        let outcome = edit(&path, &options).unwrap();
        assert!(outcome.written.is_none());
        assert_eq!(fs::read(&path).unwrap(), before);

        let snapshot: MetadataSnapshot = serde_json::from_str(&fs::read_to_string(&meta_dump).unwrap()).unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("原标题"));
        assert_eq!(snapshot.identifier.as_deref(), Some("urn:test:book"));
        assert_eq!(snapshot.creators, vec!["Test Author".to_string()]);
        assert!(fs::read_to_string(&nav_dump).unwrap().contains("epub:type=\"toc\""));
    }

    #[test]
    fn test_snapshot_omits_empty_fields() {
        let mut metadata = Metadata::new();
        metadata.titles.push(DcMeta::new("标题"));
        metadata.descriptions.push(DcMeta::new(""));
        metadata.creators.push(DcMeta::new("  "));
        let json = serde_json::to_string(&MetadataSnapshot::from_metadata(&metadata)).unwrap();
        assert_eq!(json, r#"{"title":"标题"}"#);
    }

    #[test]
    fn test_replace_nav() {
        let dir = tempdir().unwrap();
        let path = sample(dir.path());
        let replacement = dir.path().join("new-nav.xhtml");
        let content = r#"<html xmlns="http://www.w3.org/1999/xhtml"><body><nav epub:type="toc" xmlns:epub="http://www.idpf.org/2007/ops"><ol><li><a href="Text/c1.xhtml">唯一一章</a></li></ol></nav></body></html>"#;
        fs::write(&replacement, content).unwrap();

        let options = EditOptions {
            nav_replace: Some(replacement),
            ..EditOptions::default()
        };
        let outcome = edit(&path, &options).unwrap();
        assert!(outcome.written.is_some());

        let volume = Volume::open(&path).unwrap();
        assert_eq!(fs::read_to_string(volume.nav_path().unwrap()).unwrap(), content);
        assert_ne!(volume.package().metadata.modified(), Some("2020-01-01T00:00:00Z"));
    }

    #[test]
    fn test_replace_nav_errors() {
        let dir = tempdir().unwrap();
        let path = sample(dir.path());
        let before = fs::read(&path).unwrap();

        let options = EditOptions {
            nav_replace: Some(dir.path().join("absent.xhtml")),
            ..EditOptions::default()
        };
        assert_eq!(edit(&path, &options).unwrap_err().kind(), ErrorKind::Input);

        let broken = dir.path().join("broken.xhtml");
        fs::write(&broken, "<html><body></html>").unwrap();
        let options = EditOptions {
            nav_replace: Some(broken),
            ..EditOptions::default()
        };
        assert_eq!(edit(&path, &options).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(fs::read(&path).unwrap(), before);

        let book = BookFixture::new("plain", "无导航").chapter("c1", "<p>x</p>").without_nav();
        let plain = write_book(dir.path(), &book);
        let options = EditOptions {
            nav_replace: Some(dir.path().join("new-nav.xhtml")),
            ..EditOptions::default()
        };
        fs::write(dir.path().join("new-nav.xhtml"), "<html/>").unwrap();
        let err = edit(&plain, &options).unwrap_err();
        assert!(matches!(err, EpubError::NavError(_)));
    }
}
