//! 文本替换
//!
//! 单条规则对一段文本的查找与替换，返回替换结果和匹配次数。

use crate::epub::rewrite::rule::CompiledRule;
use std::borrow::Cow;

/// 对文本应用一条规则
pub fn apply_rule<'a>(text: &'a str, rule: &CompiledRule) -> (Cow<'a, str>, usize) {
    if text.is_empty() {
        return (Cow::Borrowed(text), 0);
    }
    let find = rule.rule.find.as_str();
    let replace = rule.rule.replace.as_str();

    if let Some(regex) = &rule.regex {
        let matches = regex.find_iter(text).count();
        if matches == 0 {
            return (Cow::Borrowed(text), 0);
        }
        return (regex.replace_all(text, replace), matches);
    }

    if !rule.rule.ignore_case {
        let matches = text.matches(find).count();
        if matches == 0 {
            return (Cow::Borrowed(text), 0);
        }
        return (Cow::Owned(text.replace(find, replace)), matches);
    }

    replace_ignore_case(text, find, replace)
}

/// 依次应用多条规则，后面的规则看到前面规则的结果
pub fn apply_rules<'r>(text: &str, rules: impl IntoIterator<Item = &'r CompiledRule>) -> (String, usize) {
    let mut current = text.to_string();
    let mut total = 0;
    for rule in rules {
        let (next, count) = apply_rule(&current, rule);
        total += count;
        if let Cow::Owned(next) = next {
            current = next;
        }
    }
    (current, total)
}

/// 忽略大小写的字面量替换
///
/// 在小写副本中查找，再把位置映射回原文，替换文本拼接进保持原大小写的字符串。
/// 某些字符小写后字节长度会变化，因此逐字节记录小写副本到原文的偏移。
pub fn replace_ignore_case<'a>(text: &'a str, find: &str, replace: &str) -> (Cow<'a, str>, usize) {
    let needle = find.to_lowercase();
    if needle.is_empty() {
        return (Cow::Borrowed(text), 0);
    }

    let mut lower = String::with_capacity(text.len());
    // origin[i]: 小写副本第i字节对应的原文偏移
    let mut origin = Vec::with_capacity(text.len() + 1);
    // boundary[i]: 第i字节是否为某个原文字符小写结果的起点
    let mut boundary = Vec::with_capacity(text.len() + 1);
    for (offset, ch) in text.char_indices() {
        let start = lower.len();
        lower.extend(ch.to_lowercase());
        for i in start..lower.len() {
            origin.push(offset);
            boundary.push(i == start);
        }
    }
    origin.push(text.len());
    boundary.push(true);

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 0;
    let mut matches = 0;
    while let Some(found) = lower[pos..].find(&needle) {
        let start = pos + found;
        let end = start + needle.len();
        if !boundary[start] || !boundary[end] {
            pos = start + lower[start..].chars().next().map_or(1, char::len_utf8);
            continue;
        }
        out.push_str(&text[copied..origin[start]]);
        out.push_str(replace);
        copied = origin[end];
        pos = end;
        matches += 1;
    }

    if matches == 0 {
        return (Cow::Borrowed(text), 0);
    }
    out.push_str(&text[copied..]);
    (Cow::Owned(out), matches)
}
