//! OPF序列化模块
//!
//! 把 [`PackageDocument`] 写回OPF XML。重新解析写出的文档会得到相同的结构。

use crate::epub::error::{EpubError, Result};
use crate::epub::opf::metadata::DcMeta;
use crate::epub::opf::parser::PackageDocument;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

pub const NS_OPF: &str = "http://www.idpf.org/2007/opf";
pub const NS_DC: &str = "http://purl.org/dc/elements/1.1/";

type XmlWriter = Writer<Vec<u8>>;

impl PackageDocument {
    /// 序列化为OPF XML文本
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut package = BytesStart::new("package");
        package.push_attribute(("xmlns", NS_OPF));
        for (key, value) in &self.namespaces {
            package.push_attribute((key.as_str(), value.as_str()));
        }
        let version = if self.version.is_empty() { "3.0" } else { self.version.as_str() };
        package.push_attribute(("version", version));
        push_optional(&mut package, "unique-identifier", &self.unique_identifier);
        push_optional(&mut package, "xml:lang", &self.lang);
        push_optional(&mut package, "prefix", &self.prefix);
        push_optional(&mut package, "dir", &self.dir);
        writer.write_event(Event::Start(package))?;

        self.write_metadata(&mut writer)?;
        self.write_manifest(&mut writer)?;
        self.write_spine(&mut writer)?;
        self.write_guide(&mut writer)?;

        writer.write_event(Event::End(BytesEnd::new("package")))?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| EpubError::OpfParseError(e.to_string()))
    }

    fn write_metadata(&self, writer: &mut XmlWriter) -> Result<()> {
        let metadata = &self.metadata;
        let mut start = BytesStart::new("metadata");
        for (key, value) in &metadata.namespaces {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if !self.declares("xmlns:dc") {
            start.push_attribute(("xmlns:dc", NS_DC));
        }
        if !self.declares("xmlns:opf") {
            start.push_attribute(("xmlns:opf", NS_OPF));
        }
        writer.write_event(Event::Start(start))?;

        let lists = [
            ("dc:title", &metadata.titles),
            ("dc:creator", &metadata.creators),
            ("dc:language", &metadata.languages),
            ("dc:identifier", &metadata.identifiers),
            ("dc:description", &metadata.descriptions),
        ];
        for (name, nodes) in lists {
            for node in nodes {
                write_dc(writer, name, node)?;
            }
        }

        for extra in &metadata.extra {
            let mut start = BytesStart::new(extra.name.as_str());
            for (key, value) in &extra.attributes {
                start.push_attribute((key.as_str(), value.as_str()));
            }
            write_text_element(writer, start, &extra.value)?;
        }

        for meta in &metadata.meta {
            let mut start = BytesStart::new("meta");
            push_optional(&mut start, "property", &meta.property);
            push_optional(&mut start, "name", &meta.name);
            push_optional(&mut start, "content", &meta.content);
            push_optional(&mut start, "refines", &meta.refines);
            push_optional(&mut start, "id", &meta.id);
            push_optional(&mut start, "scheme", &meta.scheme);
            write_text_element(writer, start, &meta.value)?;
        }

        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
        Ok(())
    }

    fn write_manifest(&self, writer: &mut XmlWriter) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("manifest")))?;
        for item in &self.manifest {
            let mut start = BytesStart::new("item");
            start.push_attribute(("id", item.id.as_str()));
            start.push_attribute(("href", item.href.as_str()));
            start.push_attribute(("media-type", item.media_type.as_str()));
            push_optional(&mut start, "properties", &item.properties);
            push_optional(&mut start, "fallback", &item.fallback);
            push_optional(&mut start, "media-overlay", &item.media_overlay);
            writer.write_event(Event::Empty(start))?;
        }
        writer.write_event(Event::End(BytesEnd::new("manifest")))?;
        Ok(())
    }

    fn write_spine(&self, writer: &mut XmlWriter) -> Result<()> {
        let spine = &self.spine;
        let mut start = BytesStart::new("spine");
        push_optional(&mut start, "id", &spine.id);
        push_optional(&mut start, "toc", &spine.toc);
        push_optional(
            &mut start,
            "page-progression-direction",
            &spine.page_progression_direction,
        );
        writer.write_event(Event::Start(start))?;
        for itemref in &spine.itemrefs {
            let mut start = BytesStart::new("itemref");
            start.push_attribute(("idref", itemref.idref.as_str()));
            if !itemref.linear {
                start.push_attribute(("linear", "no"));
            }
            push_optional(&mut start, "id", &itemref.id);
            push_optional(&mut start, "properties", &itemref.properties);
            writer.write_event(Event::Empty(start))?;
        }
        writer.write_event(Event::End(BytesEnd::new("spine")))?;
        Ok(())
    }

    fn write_guide(&self, writer: &mut XmlWriter) -> Result<()> {
        if self.guide.is_empty() {
            return Ok(());
        }
        writer.write_event(Event::Start(BytesStart::new("guide")))?;
        for reference in &self.guide {
            let mut start = BytesStart::new("reference");
            start.push_attribute(("type", reference.kind.as_str()));
            push_optional(&mut start, "title", &reference.title);
            start.push_attribute(("href", reference.href.as_str()));
            writer.write_event(Event::Empty(start))?;
        }
        writer.write_event(Event::End(BytesEnd::new("guide")))?;
        Ok(())
    }

    fn declares(&self, key: &str) -> bool {
        self.namespaces
            .iter()
            .chain(self.metadata.namespaces.iter())
            .any(|(k, _)| k == key)
    }
}

fn write_dc(writer: &mut XmlWriter, name: &str, node: &DcMeta) -> Result<()> {
    let mut start = BytesStart::new(name);
    push_optional(&mut start, "id", &node.id);
    push_optional(&mut start, "opf:role", &node.role);
    push_optional(&mut start, "opf:file-as", &node.file_as);
    push_optional(&mut start, "opf:scheme", &node.scheme);
    push_optional(&mut start, "xml:lang", &node.lang);
    write_text_element(writer, start, &node.value)
}

fn write_text_element(writer: &mut XmlWriter, start: BytesStart, value: &str) -> Result<()> {
    let end = BytesEnd::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

fn push_optional(start: &mut BytesStart, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        start.push_attribute((key, value.as_str()));
    }
}
