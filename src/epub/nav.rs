//! 导航文档模块
//!
//! 生成合并后的EPUB3导航文档，检查替换用导航文档是否为合法XML，
//! 以及列出导航文档中的目录链接。

use crate::epub::error::{EpubError, Result};
use once_cell::sync::Lazy;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use scraper::{ElementRef, Html, Selector};

const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";
const NS_OPS: &str = "http://www.idpf.org/2007/ops";

static NAV_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("nav").expect("nav选择器"));
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("链接选择器"));

/// 导航链接
#[derive(Debug, Clone, PartialEq)]
pub struct NavLink {
    /// 显示文本
    pub label: String,
    /// 链接目标（相对于导航文档）
    pub href: String,
}

impl NavLink {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: href.into(),
        }
    }
}

/// 生成只有一层目录的EPUB3导航文档
///
/// # 参数
/// * `title` - 文档标题与目录标题
/// * `lang` - 文档语言，可选
/// * `links` - 目录链接，按顺序输出
pub fn render_nav(title: &str, lang: Option<&str>, links: &[NavLink]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped("html")))?;

    let mut html = BytesStart::new("html");
    html.push_attribute(("xmlns", NS_XHTML));
    html.push_attribute(("xmlns:epub", NS_OPS));
    if let Some(lang) = lang.filter(|l| !l.is_empty()) {
        html.push_attribute(("lang", lang));
        html.push_attribute(("xml:lang", lang));
    }
    writer.write_event(Event::Start(html))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    write_text(&mut writer, BytesStart::new("title"), title)?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;
    let mut nav = BytesStart::new("nav");
    nav.push_attribute(("epub:type", "toc"));
    nav.push_attribute(("id", "toc"));
    writer.write_event(Event::Start(nav))?;
    write_text(&mut writer, BytesStart::new("h1"), title)?;
    writer.write_event(Event::Start(BytesStart::new("ol")))?;
    for link in links {
        writer.write_event(Event::Start(BytesStart::new("li")))?;
        let mut anchor = BytesStart::new("a");
        anchor.push_attribute(("href", link.href.as_str()));
        write_text(&mut writer, anchor, &link.label)?;
        writer.write_event(Event::End(BytesEnd::new("li")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("ol")))?;
    writer.write_event(Event::End(BytesEnd::new("nav")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    String::from_utf8(bytes).map_err(|e| EpubError::NavError(e.to_string()))
}

fn write_text(writer: &mut Writer<Vec<u8>>, start: BytesStart, text: &str) -> Result<()> {
    let end = BytesEnd::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// 检查导航文档是否为格式良好的XML
pub fn check_well_formed(content: &str) -> Result<()> {
    let mut reader = Reader::from_str(content);
    let mut depth = 0usize;
    let mut seen_root = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                depth += 1;
                seen_root = true;
            }
            Ok(Event::Empty(_)) => seen_root = true,
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(EpubError::NavError(format!(
                    "第{}字节处XML解析失败: {}",
                    reader.error_position(),
                    e
                )));
            }
        }
    }
    if !seen_root || depth != 0 {
        return Err(EpubError::NavError("导航文档不完整".to_string()));
    }
    Ok(())
}

/// 列出导航文档的目录链接
///
/// 优先使用 `epub:type` 含 `toc` 的 `<nav>`，否则使用第一个 `<nav>`。
pub fn toc_links(html: &str) -> Vec<NavLink> {
    let document = Html::parse_document(html);
    let navs: Vec<ElementRef> = document.select(&NAV_SELECTOR).collect();
    let toc = navs
        .iter()
        .find(|nav| {
            nav.value()
                .attr("epub:type")
                .is_some_and(|t| t.split_whitespace().any(|token| token == "toc"))
        })
        .or_else(|| navs.first());

    let Some(toc) = toc else {
        return Vec::new();
    };

    toc.select(&LINK_SELECTOR)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let label = anchor.text().collect::<Vec<_>>().join(" ");
            let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(NavLink::new(label, href))
        })
        .collect()
}
