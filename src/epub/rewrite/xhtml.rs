//! XHTML流式改写
//!
//! 对文档做一次顺序遍历：文本和CDATA经过当前生效的规则，
//! 其余事件原样写回。

use crate::epub::rewrite::rule::CompiledRule;
use crate::epub::rewrite::text::apply_rule;
use quick_xml::Writer;
use quick_xml::escape::{partial_escape, resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesCData, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use tracing::warn;

/// 单条规则的选择器状态
#[derive(Debug, Clone, Default)]
pub struct RuleState {
    /// 每个打开的元素是否匹配规则的选择器
    depth: Vec<bool>,
    /// 打开的匹配元素数量
    active: usize,
    /// 无选择器的规则始终生效
    always: bool,
}

impl RuleState {
    pub fn new(rule: &CompiledRule) -> Self {
        Self {
            always: !rule.has_selectors(),
            ..Self::default()
        }
    }

    /// 进入一个元素
    pub fn enter(&mut self, matched: bool) {
        if self.always {
            return;
        }
        self.depth.push(matched);
        if matched {
            self.active += 1;
        }
    }

    /// 离开一个元素
    pub fn leave(&mut self) {
        if self.always {
            return;
        }
        if self.depth.pop() == Some(true) {
            self.active -= 1;
        }
    }

    /// 当前位置是否在规则的作用范围内
    pub fn is_active(&self) -> bool {
        self.always || self.active > 0
    }
}

/// 单个文件的改写结果
#[derive(Debug, Default)]
pub struct FileRewrite {
    pub match_count: usize,
    /// 文本有变化时为改写后的完整内容
    pub content: Option<Vec<u8>>,
}

/// 改写一个XHTML文档
///
/// # 参数
/// * `content` - 文档内容
/// * `rules` - 编译后的规则，按顺序应用
///
/// # 返回值
/// * `Result<FileRewrite, quick_xml::Error>` - 匹配次数和可能的新内容
pub fn rewrite_xhtml(content: &str, rules: &[CompiledRule]) -> Result<FileRewrite, quick_xml::Error> {
    let mut reader = Reader::from_str(content);
    let mut writer = Writer::new(Vec::with_capacity(content.len()));
    let mut states: Vec<RuleState> = rules.iter().map(RuleState::new).collect();
    let mut match_count = 0;
    let mut changed = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                let class = class_attribute(&e)?;
                let classes: Vec<&str> = class.split_whitespace().collect();
                for (rule, state) in rules.iter().zip(states.iter_mut()) {
                    state.enter(rule.matches_element(&tag, &classes));
                }
                writer.write_event(Event::Start(dedupe_namespaces(e)?))?;
            }
            Event::End(e) => {
                for state in states.iter_mut() {
                    state.leave();
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => writer.write_event(Event::Empty(dedupe_namespaces(e)?))?,
            Event::Text(e) => {
                let rewritten = match e.unescape_with(resolve_html5_entity) {
                    Ok(original) => {
                        let (text, count) = apply_active(&original, rules, &states);
                        match_count += count;
                        text.filter(|text| *text != original)
                            .map(|text| partial_escape(&text).into_owned())
                    }
                    Err(err) => {
                        warn!(position = reader.buffer_position(), "文本含无法识别的实体，实体原样保留: {}", err);
                        let raw = String::from_utf8_lossy(&e).into_owned();
                        let (text, count) = rewrite_around_entities(&raw, rules, &states);
                        match_count += count;
                        text
                    }
                };
                match rewritten {
                    Some(escaped) => {
                        changed = true;
                        writer.write_event(Event::Text(BytesText::from_escaped(escaped)))?;
                    }
                    None => writer.write_event(Event::Text(e))?,
                }
            }
            Event::CData(e) => {
                let original = String::from_utf8_lossy(&e).into_owned();
                let (text, count) = apply_active(&original, rules, &states);
                match_count += count;
                match text {
                    Some(text) if text != original => {
                        changed = true;
                        writer.write_event(Event::CData(BytesCData::new(text)))?;
                    }
                    _ => writer.write_event(Event::CData(e))?,
                }
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    Ok(FileRewrite {
        match_count,
        content: changed.then(|| writer.into_inner()),
    })
}

/// 依次应用所有生效的规则，没有任何改动时返回None
fn apply_active(text: &str, rules: &[CompiledRule], states: &[RuleState]) -> (Option<String>, usize) {
    let mut current: Cow<str> = Cow::Borrowed(text);
    let mut total = 0;
    for (rule, state) in rules.iter().zip(states) {
        if !state.is_active() {
            continue;
        }
        let (next, count) = apply_rule(&current, rule);
        total += count;
        if let Cow::Owned(next) = next {
            current = Cow::Owned(next);
        }
    }
    match current {
        Cow::Owned(text) => (Some(text), total),
        Cow::Borrowed(_) => (None, total),
    }
}

/// 只改写无法识别的实体之间的片段，返回转义后的文本
fn rewrite_around_entities(raw: &str, rules: &[CompiledRule], states: &[RuleState]) -> (Option<String>, usize) {
    let mut out = String::with_capacity(raw.len());
    let mut total = 0;
    let mut changed = false;
    for (segment, known) in entity_segments(raw) {
        let unescaped = if known {
            unescape_with(segment, resolve_html5_entity).ok()
        } else {
            None
        };
        let Some(original) = unescaped else {
            out.push_str(segment);
            continue;
        };
        let (text, count) = apply_active(&original, rules, states);
        total += count;
        match text.filter(|text| text.as_str() != original.as_ref()) {
            Some(text) => {
                changed = true;
                out.push_str(&partial_escape(&text));
            }
            None => out.push_str(segment),
        }
    }
    (changed.then_some(out), total)
}

/// 把原始文本切成普通片段和无法识别的实体引用，布尔值为false的是实体
fn entity_segments(raw: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while let Some(offset) = raw[pos..].find('&') {
        let amp = pos + offset;
        let name_end = raw[amp + 1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .map(|i| amp + 1 + i);
        let end = match name_end {
            Some(i) if raw[i..].starts_with(';') => i + 1,
            _ => {
                pos = amp + 1;
                continue;
            }
        };
        if unescape_with(&raw[amp..end], resolve_html5_entity).is_err() {
            if start < amp {
                segments.push((&raw[start..amp], true));
            }
            segments.push((&raw[amp..end], false));
            start = end;
        }
        pos = end;
    }
    if start < raw.len() {
        segments.push((&raw[start..], true));
    }
    segments
}

fn class_attribute(start: &BytesStart) -> Result<String, quick_xml::Error> {
    for attr in start.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.local_name().as_ref() == b"class" {
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            return Ok(value);
        }
    }
    Ok(String::new())
}

fn is_namespace_declaration(key: &[u8]) -> bool {
    key == b"xmlns" || key.starts_with(b"xmlns:")
}

/// 去掉同一开始标签里重复的命名空间声明，没有重复时原样返回
fn dedupe_namespaces(start: BytesStart<'_>) -> Result<BytesStart<'_>, quick_xml::Error> {
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut duplicate = false;
    for attr in start.attributes().with_checks(false) {
        let key = attr?.key.as_ref().to_vec();
        if is_namespace_declaration(&key) {
            if seen.contains(&key) {
                duplicate = true;
                break;
            }
            seen.push(key);
        }
    }
    if !duplicate {
        return Ok(start);
    }

    let mut clean = BytesStart::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    seen.clear();
    for attr in start.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref().to_vec();
        if is_namespace_declaration(&key) {
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
        }
        clean.push_attribute(attr);
    }
    Ok(clean)
}
