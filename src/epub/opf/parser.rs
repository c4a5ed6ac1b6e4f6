//! OPF解析器模块
//!
//! 提供OPF（Open Packaging Format）文件的XML解析功能。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::{
    manifest::ManifestItem,
    metadata::{DcMeta, ExtraElement, MetaNode, Metadata},
    spine::{GuideReference, Spine, SpineItem},
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashSet;

/// OPF文件解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageDocument {
    /// EPUB版本
    pub version: String,
    /// 唯一标识符所在元素的ID
    pub unique_identifier: Option<String>,
    pub lang: Option<String>,
    pub prefix: Option<String>,
    pub dir: Option<String>,
    /// package元素上声明的带前缀命名空间
    pub namespaces: Vec<(String, String)>,
    /// 元数据
    pub metadata: Metadata,
    /// 清单项(文件列表)，保持原顺序
    pub manifest: Vec<ManifestItem>,
    /// 脊柱(阅读顺序)
    pub spine: Spine,
    /// EPUB2导览
    pub guide: Vec<GuideReference>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Metadata,
    Manifest,
    Spine,
    Guide,
}

/// 正在收集文本的元数据子元素
enum Pending {
    Dc(usize, DcMeta),
    Meta(MetaNode),
    Extra(ExtraElement),
}

const CORE_DC: [&str; 5] = ["title", "creator", "language", "identifier", "description"];

impl PackageDocument {
    /// 解析OPF文件内容
    ///
    /// # 参数
    /// * `xml_content` - OPF文件的XML内容
    ///
    /// # 返回值
    /// * `Result<PackageDocument, EpubError>` - 解析后的包文档
    pub fn parse_xml(xml_content: &str) -> Result<PackageDocument> {
        let mut reader = Reader::from_str(xml_content);
        reader.config_mut().trim_text(true);
        reader.config_mut().expand_empty_elements = true;

        let mut package = PackageDocument::default();
        let mut seen_package = false;
        let mut section = Section::None;
        let mut pending: Option<Pending> = None;
        let mut text_content = String::new();
        // 元数据子元素内部的嵌套深度
        let mut nested = 0usize;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| EpubError::OpfParseError(format!("XML解析错误: {}", e)))?;
            match event {
                Event::Start(ref e) => {
                    let local_name_bytes = e.local_name();
                    let local_name = String::from_utf8_lossy(local_name_bytes.as_ref()).into_owned();

                    if pending.is_some() {
                        nested += 1;
                        continue;
                    }

                    match (section, local_name.as_str()) {
                        (Section::None, "package") => {
                            seen_package = true;
                            Self::parse_package_attributes(e, &mut package)?;
                        }
                        (Section::None, "metadata") => {
                            section = Section::Metadata;
                            for (key, value) in read_attributes(e)? {
                                if key.starts_with("xmlns:") {
                                    package.metadata.namespaces.push((key, value));
                                }
                            }
                        }
                        (Section::None, "manifest") => section = Section::Manifest,
                        (Section::None, "spine") => {
                            section = Section::Spine;
                            Self::parse_spine_attributes(e, &mut package.spine)?;
                        }
                        (Section::None, "guide") => section = Section::Guide,
                        (Section::Metadata, "meta") => {
                            pending = Some(Pending::Meta(Self::parse_meta(e)?));
                            text_content.clear();
                        }
                        (Section::Metadata, name) => {
                            pending = Some(match CORE_DC.iter().position(|dc| *dc == name) {
                                Some(kind) => Pending::Dc(kind, Self::parse_dc(e)?),
                                None => Pending::Extra(ExtraElement {
                                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                                    attributes: read_attributes(e)?,
                                    value: String::new(),
                                }),
                            });
                            text_content.clear();
                        }
                        (Section::Manifest, "item") => {
                            package.manifest.push(Self::parse_manifest_item(e)?);
                        }
                        (Section::Spine, "itemref") => {
                            package.spine.itemrefs.push(Self::parse_spine_item(e)?);
                        }
                        (Section::Guide, "reference") => {
                            if let Some(reference) = Self::parse_guide_reference(e)? {
                                package.guide.push(reference);
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) => {
                    if nested > 0 {
                        nested -= 1;
                        continue;
                    }
                    if let Some(done) = pending.take() {
                        let value = text_content.trim().to_string();
                        match done {
                            Pending::Dc(kind, mut dc) => {
                                dc.value = value;
                                package.metadata.core_lists_mut()[kind].push(dc);
                            }
                            Pending::Meta(mut meta) => {
                                meta.value = value;
                                package.metadata.meta.push(meta);
                            }
                            Pending::Extra(mut extra) => {
                                extra.value = value;
                                package.metadata.extra.push(extra);
                            }
                        }
                        text_content.clear();
                        continue;
                    }
                    match e.local_name().as_ref() {
                        b"metadata" | b"manifest" | b"spine" | b"guide" => {
                            section = Section::None;
                        }
                        _ => {}
                    }
                }
                Event::Text(e) => {
                    if pending.is_some() {
                        text_content.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if pending.is_some() {
                        text_content.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_package {
            return Err(EpubError::OpfParseError("缺少package根元素".to_string()));
        }

        package.validate()?;
        Ok(package)
    }

    /// 检查清单与脊柱的一致性
    ///
    /// 清单ID必须唯一，每个脊柱项必须引用存在的清单项。
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for item in &self.manifest {
            if !ids.insert(item.id.as_str()) {
                return Err(EpubError::OpfParseError(format!("重复的清单ID: {}", item.id)));
            }
        }
        for itemref in &self.spine.itemrefs {
            if !ids.contains(itemref.idref.as_str()) {
                return Err(EpubError::OpfParseError(format!(
                    "脊柱引用了不存在的清单项: {}",
                    itemref.idref
                )));
            }
        }
        Ok(())
    }

    fn parse_package_attributes(e: &BytesStart, package: &mut PackageDocument) -> Result<()> {
        for (key, value) in read_attributes(e)? {
            match key.as_str() {
                "version" => package.version = value,
                "unique-identifier" => package.unique_identifier = Some(value),
                "xml:lang" => package.lang = Some(value),
                "prefix" => package.prefix = Some(value),
                "dir" => package.dir = Some(value),
                k if k.starts_with("xmlns:") => package.namespaces.push((key, value)),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_spine_attributes(e: &BytesStart, spine: &mut Spine) -> Result<()> {
        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "id" => spine.id = Some(value),
                "toc" => spine.toc = Some(value),
                "page-progression-direction" => spine.page_progression_direction = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_dc(e: &BytesStart) -> Result<DcMeta> {
        let mut dc = DcMeta::default();
        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "id" => dc.id = Some(value),
                "role" => dc.role = Some(value),
                "file-as" => dc.file_as = Some(value),
                "scheme" => dc.scheme = Some(value),
                "lang" => dc.lang = Some(value),
                _ => {}
            }
        }
        Ok(dc)
    }

    fn parse_meta(e: &BytesStart) -> Result<MetaNode> {
        let mut meta = MetaNode::default();
        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "property" => meta.property = Some(value),
                "name" => meta.name = Some(value),
                "content" => meta.content = Some(value),
                "refines" => meta.refines = Some(value),
                "id" => meta.id = Some(value),
                "scheme" => meta.scheme = Some(value),
                _ => {}
            }
        }
        Ok(meta)
    }

    /// 解析清单项
    fn parse_manifest_item(e: &BytesStart) -> Result<ManifestItem> {
        let mut item = ManifestItem::new(String::new(), String::new(), String::new());

        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "id" => item.id = value,
                "href" => item.href = value,
                "media-type" => item.media_type = value,
                "properties" => item.properties = Some(value),
                "fallback" => item.fallback = Some(value),
                "media-overlay" => item.media_overlay = Some(value),
                _ => {}
            }
        }

        if item.id.is_empty() || item.href.is_empty() {
            return Err(EpubError::OpfParseError(format!(
                "清单项缺少id或href (id={:?}, href={:?})",
                item.id, item.href
            )));
        }

        Ok(item)
    }

    /// 解析脊柱项
    fn parse_spine_item(e: &BytesStart) -> Result<SpineItem> {
        let mut spine_item = SpineItem::new(String::new());

        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "idref" => spine_item.idref = value,
                "linear" => spine_item.linear = value.trim() != "no",
                "id" => spine_item.id = Some(value),
                "properties" => spine_item.properties = Some(value),
                _ => {}
            }
        }

        if spine_item.idref.is_empty() {
            return Err(EpubError::OpfParseError("脊柱项缺少idref".to_string()));
        }

        Ok(spine_item)
    }

    fn parse_guide_reference(e: &BytesStart) -> Result<Option<GuideReference>> {
        let mut kind = String::new();
        let mut title = None;
        let mut href = String::new();
        for (key, value) in read_local_attributes(e)? {
            match key.as_str() {
                "type" => kind = value,
                "title" => title = Some(value),
                "href" => href = value,
                _ => {}
            }
        }
        if href.is_empty() {
            return Ok(None);
        }
        Ok(Some(GuideReference { kind, title, href }))
    }

    /// 根据ID获取清单项
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// 获取导航文档清单项
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.is_nav())
    }

    /// 从第 `from` 个脊柱项起，获取第一个线性项对应的href，没有线性项时退回第一项
    pub fn entry_href(&self, from: usize) -> Option<&str> {
        let itemrefs = self.spine.itemrefs.get(from..)?;
        itemrefs
            .iter()
            .find(|itemref| itemref.is_linear())
            .or_else(|| itemrefs.first())
            .and_then(|itemref| self.manifest_item(&itemref.idref))
            .map(|item| item.href.as_str())
    }
}

/// 读取元素的全部属性，键为带前缀的完整名称
fn read_attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|err| EpubError::XmlError(quick_xml::Error::InvalidAttr(err)))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

/// 读取元素属性，键为去掉前缀的本地名称
fn read_local_attributes(e: &BytesStart) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|err| EpubError::XmlError(quick_xml::Error::InvalidAttr(err)))?;
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}
