//! 改写规则模块
//!
//! 定义改写规则、作用范围以及编译后的规则。

use crate::epub::error::{EpubError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 开头的内联标志组，如 `(?i)`、`(?s-m)`，第一个分组为打开的标志
static INLINE_FLAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\?([imsxuUR]*)(?:-[imsxuUR]*)?\)").expect("内联标志正则"));

/// 模式开头的标志组是否已经打开了忽略大小写
fn enables_ignore_case(pattern: &str) -> bool {
    INLINE_FLAGS
        .captures(pattern)
        .and_then(|caps| caps.get(1))
        .is_some_and(|flags| flags.as_str().contains('i'))
}

/// 改写规则
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    /// 查找的文本或正则表达式
    pub find: String,
    /// 替换文本，正则模式下支持 `$1`、`${name}` 分组引用
    #[serde(default)]
    pub replace: String,
    /// 是否为正则表达式
    #[serde(default, skip_serializing_if = "is_false")]
    pub regex: bool,
    /// 是否忽略大小写
    #[serde(default, skip_serializing_if = "is_false")]
    pub ignore_case: bool,
    /// 元素选择器（`p`、`.note`、`p.note`，逗号分隔多个）
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl RewriteRule {
    /// 创建大小写敏感的字面量规则
    pub fn literal(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            ..Self::default()
        }
    }

    /// 创建正则规则
    pub fn pattern(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            regex: true,
            ..Self::literal(find, replace)
        }
    }

    /// 设置忽略大小写
    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    /// 添加选择器
    pub fn within(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }
}

/// 从JSON文件读取规则列表
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Vec<RewriteRule>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| {
        EpubError::InvalidInput(format!("无法读取规则文件 {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&data)?)
}

/// 改写范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RewriteScope {
    /// XHTML正文
    #[default]
    Body,
    /// 元数据
    Metadata,
    /// 正文与元数据
    Both,
}

impl RewriteScope {
    pub fn includes_body(self) -> bool {
        matches!(self, RewriteScope::Body | RewriteScope::Both)
    }

    pub fn includes_metadata(self) -> bool {
        matches!(self, RewriteScope::Metadata | RewriteScope::Both)
    }
}

impl FromStr for RewriteScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" => Ok(RewriteScope::Body),
            "metadata" | "meta" => Ok(RewriteScope::Metadata),
            "both" | "all" => Ok(RewriteScope::Both),
            other => Err(format!("未知的改写范围: {} (可选 body, metadata, both)", other)),
        }
    }
}

impl fmt::Display for RewriteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewriteScope::Body => "body",
            RewriteScope::Metadata => "metadata",
            RewriteScope::Both => "both",
        };
        f.write_str(name)
    }
}

/// 元素选择器：标签名和类名至少有一个
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSelector {
    /// 小写的标签名
    pub tag: Option<String>,
    pub class: Option<String>,
}

impl ElementSelector {
    /// 判断元素是否匹配
    ///
    /// # 参数
    /// * `tag` - 小写的元素本地名
    /// * `classes` - class属性按空白拆分后的列表
    pub fn matches(&self, tag: &str, classes: &[&str]) -> bool {
        if let Some(want) = &self.tag {
            if want != tag {
                return false;
            }
        }
        if let Some(want) = &self.class {
            if !classes.iter().any(|c| c == want) {
                return false;
            }
        }
        true
    }
}

/// 解析选择器字符串列表
pub fn parse_selectors(raw: &[String]) -> Result<Vec<ElementSelector>> {
    let mut selectors = Vec::new();
    for part in raw.iter().flat_map(|s| s.split(',')) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (tag, class) = match part.split_once('.') {
            Some((tag, class)) => (tag.trim(), class.trim()),
            None => (part, ""),
        };
        if tag.is_empty() && class.is_empty() {
            return Err(EpubError::InvalidInput(format!("无效的选择器: {:?}", part)));
        }
        selectors.push(ElementSelector {
            tag: (!tag.is_empty()).then(|| tag.to_ascii_lowercase()),
            class: (!class.is_empty()).then(|| class.to_string()),
        });
    }
    Ok(selectors)
}

/// 编译后的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: RewriteRule,
    pub regex: Option<Regex>,
    pub selectors: Vec<ElementSelector>,
}

impl CompiledRule {
    /// 是否带有元素选择器
    pub fn has_selectors(&self) -> bool {
        !self.selectors.is_empty()
    }

    /// 判断元素是否落在规则的选择范围内，无选择器的规则匹配所有元素
    pub fn matches_element(&self, tag: &str, classes: &[&str]) -> bool {
        !self.has_selectors() || self.selectors.iter().any(|s| s.matches(tag, classes))
    }
}

/// 编译规则列表
///
/// 规则列表为空、find为空或选择器无效时返回输入错误；
/// 正则无法编译时返回带规则序号和最终模式的错误。
pub fn compile_rules(rules: &[RewriteRule]) -> Result<Vec<CompiledRule>> {
    if rules.is_empty() {
        return Err(EpubError::InvalidInput("没有提供改写规则".to_string()));
    }

    let mut compiled = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        if rule.find.is_empty() {
            return Err(EpubError::InvalidInput(format!("第{}条规则缺少find", index + 1)));
        }

        let regex = if rule.regex {
            let pattern = if rule.ignore_case && !enables_ignore_case(&rule.find) {
                format!("(?i){}", rule.find)
            } else {
                rule.find.clone()
            };
            let regex = Regex::new(&pattern).map_err(|source| EpubError::InvalidRegex {
                index: index + 1,
                pattern,
                source,
            })?;
            Some(regex)
        } else {
            None
        };

        compiled.push(CompiledRule {
            rule: rule.clone(),
            regex,
            selectors: parse_selectors(&rule.selectors)?,
        });
    }
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::error::ErrorKind;

    #[test]
    fn test_parse_selectors() {
        let selectors = parse_selectors(&["P.note, .aside".to_string(), "  ".to_string(), "em".to_string()]).unwrap();
        assert_eq!(
            selectors,
            vec![
                ElementSelector { tag: Some("p".to_string()), class: Some("note".to_string()) },
                ElementSelector { tag: None, class: Some("aside".to_string()) },
                ElementSelector { tag: Some("em".to_string()), class: None },
            ]
        );
    }

    #[test]
    fn test_bare_dot_selector_rejected() {
        let err = parse_selectors(&[".".to_string()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_selector_matching() {
        let selector = ElementSelector { tag: Some("p".to_string()), class: Some("note".to_string()) };
        assert!(selector.matches("p", &["intro", "note"]));
        assert!(!selector.matches("p", &["notes"]));
        assert!(!selector.matches("div", &["note"]));
    }

    #[test]
    fn test_compile_rejects_empty_inputs() {
        assert_eq!(compile_rules(&[]).unwrap_err().kind(), ErrorKind::Input);
        let err = compile_rules(&[RewriteRule::literal("", "x")]).unwrap_err();
        assert!(err.to_string().contains("第1条"));
    }

    #[test]
    fn test_invalid_regex_names_rule_and_pattern() {
        let rules = vec![RewriteRule::literal("ok", "fine"), RewriteRule::pattern("(unclosed", "x").ignoring_case()];
        let err = compile_rules(&rules).unwrap_err();
        match &err {
            EpubError::InvalidRegex { index, pattern, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(pattern, "(?i)(unclosed");
            }
            other => panic!("期望InvalidRegex错误, 得到 {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_inline_flag_not_duplicated() {
        let rules = vec![RewriteRule::pattern("(?si)a.b", "x").ignoring_case()];
        let compiled = compile_rules(&rules).unwrap();
        assert_eq!(compiled[0].regex.as_ref().unwrap().as_str(), "(?si)a.b");

        let rules = vec![RewriteRule::pattern("(?s-i)a.b", "x").ignoring_case()];
        let compiled = compile_rules(&rules).unwrap();
        assert_eq!(compiled[0].regex.as_ref().unwrap().as_str(), "(?i)(?s-i)a.b");

        let rules = vec![RewriteRule::pattern("hello", "x").ignoring_case()];
        let compiled = compile_rules(&rules).unwrap();
        assert_eq!(compiled[0].regex.as_ref().unwrap().as_str(), "(?i)hello");
    }

    #[test]
    fn test_other_inline_flags_keep_ignore_case() {
        let rules = vec![RewriteRule::pattern("(?s)a.b", "x").ignoring_case()];
        let compiled = compile_rules(&rules).unwrap();
        let regex = compiled[0].regex.as_ref().unwrap();
        assert_eq!(regex.as_str(), "(?i)(?s)a.b");
        assert_eq!(regex.find_iter("A\nB").count(), 1);
    }

    #[test]
    fn test_rules_json_defaults() {
        let json = r#"[{"find": "Old", "replace": "New"}, {"find": "a+", "replace": "b", "regex": true, "ignore_case": true, "selectors": ["p.note"]}]"#;
        let rules: Vec<RewriteRule> = serde_json::from_str(json).unwrap();
        assert_eq!(rules[0], RewriteRule::literal("Old", "New"));
        assert_eq!(rules[1], RewriteRule::pattern("a+", "b").ignoring_case().within("p.note"));
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("Body".parse::<RewriteScope>(), Ok(RewriteScope::Body));
        assert_eq!("meta".parse::<RewriteScope>(), Ok(RewriteScope::Metadata));
        assert_eq!("both".parse::<RewriteScope>(), Ok(RewriteScope::Both));
        assert!("chapter".parse::<RewriteScope>().is_err());
    }
}
