//! 译文残留原文（汉字）处理：检测、标点归一化、「原文 --> 译文」修补回复

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

static SOURCE_SCRIPT_RE: OnceLock<Regex> = OnceLock::new();

fn source_script_re() -> &'static Regex {
    SOURCE_SCRIPT_RE.get_or_init(|| {
        Regex::new(r"[\x{3400}-\x{4DBF}\x{4E00}-\x{9FFF}\x{F900}-\x{FAFF}\x{20000}-\x{2EBEF}]+").unwrap()
    })
}

/// 全角 / 中文标点 -> ASCII 或越南语习惯写法
const PUNCTUATION_MAP: &[(char, &str)] = &[
    ('，', ","),
    ('。', "."),
    ('！', "!"),
    ('？', "?"),
    ('：', ":"),
    ('；', ";"),
    ('（', "("),
    ('）', ")"),
    ('【', "["),
    ('】', "]"),
    ('「', "“"),
    ('」', "”"),
    ('『', "“"),
    ('』', "”"),
    ('《', "“"),
    ('》', "”"),
    ('、', ","),
    ('．', "."),
    ('～', "~"),
    ('〜', "~"),
    ('｡', "."),
    ('､', ","),
    ('－', "-"),
];

const ARROW: &str = "-->";

/// 文本中连续的汉字片段（按出现顺序，可重复）
pub fn source_script_runs(text: &str) -> Vec<&str> {
    source_script_re().find_iter(text).map(|m| m.as_str()).collect()
}

/// 所有片段的汉字总数
pub fn count_source_script_chars(text: &str) -> usize {
    source_script_runs(text)
        .iter()
        .map(|run| run.chars().count())
        .sum()
}

/// 去重后的片段，保持首次出现顺序
pub fn distinct_source_script_runs(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    source_script_runs(text)
        .into_iter()
        .filter(|run| seen.insert(*run))
        .map(str::to_string)
        .collect()
}

pub fn normalize_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match PUNCTUATION_MAP.iter().find(|(src, _)| *src == ch) {
            Some((_, dest)) => out.push_str(dest),
            None => out.push(ch),
        }
    }
    out
}

/// 解析修补回复：每行 `原文 --> 译文`，两侧可带方括号
///
/// 只接受 `pending` 中的原文，同一原文首次出现生效；返回顺序与回复一致。
pub fn parse_substring_translations(reply: &str, pending: &[String]) -> Vec<(String, String)> {
    let mut accepted: Vec<(String, String)> = Vec::new();
    for line in reply.lines().map(str::trim) {
        let Some((source_raw, target_raw)) = line.split_once(ARROW) else {
            continue;
        };
        let source = strip_brackets(source_raw);
        let target = strip_brackets(target_raw);
        if source.is_empty() || target.is_empty() {
            continue;
        }
        if !pending.iter().any(|p| p == source) {
            continue;
        }
        if accepted.iter().any(|(s, _)| s == source) {
            continue;
        }
        accepted.push((source.to_string(), target.to_string()));
    }
    accepted
}

fn strip_brackets(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '[' || c == ']')
}

/// 按原文长度从长到短替换，返回实际出现并被替换的原文个数
pub fn apply_substring_translations(text: &mut String, translations: &[(String, String)]) -> usize {
    let mut ordered: Vec<&(String, String)> = translations.iter().collect();
    ordered.sort_by_key(|(source, _)| std::cmp::Reverse(source.chars().count()));

    let mut replaced = 0;
    for (source, target) in ordered {
        if text.contains(source.as_str()) {
            *text = text.replace(source.as_str(), target);
            replaced += 1;
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_script_runs() {
        let text = "Trương Tam nói 你好 rồi bỏ đi, 你好 và 再见.";
        assert_eq!(source_script_runs(text), vec!["你好", "你好", "再见"]);
        assert_eq!(count_source_script_chars(text), 6);
        assert_eq!(distinct_source_script_runs(text), vec!["你好", "再见"]);
        assert_eq!(count_source_script_chars("không có chữ Hán"), 0);
    }

    #[test]
    fn test_extension_b_is_counted() {
        assert_eq!(count_source_script_chars("𠀀𠀁"), 2);
    }

    #[test]
    fn test_normalize_punctuation() {
        assert_eq!(normalize_punctuation("Hắn nói：「Đi！」"), "Hắn nói:“Đi!”");
        assert_eq!(normalize_punctuation("《Kiếm》、（x）～"), "“Kiếm”,(x)~");
    }

    #[test]
    fn test_parse_substring_translations() {
        let pending = vec!["你好".to_string(), "再见".to_string()];
        let reply = "[你好] --> [Xin chào]\n再见 --> Tạm biệt\n你好 --> lặp lại\n陌生 --> lạ\nrác";
        let parsed = parse_substring_translations(reply, &pending);
        assert_eq!(
            parsed,
            vec![
                ("你好".to_string(), "Xin chào".to_string()),
                ("再见".to_string(), "Tạm biệt".to_string()),
            ]
        );
    }

    #[test]
    fn test_apply_longest_first() {
        let mut text = "他说你好世界，你好".to_string();
        let translations = vec![
            ("你好".to_string(), "xin chào".to_string()),
            ("你好世界".to_string(), "chào thế giới".to_string()),
            ("不在".to_string(), "vắng".to_string()),
        ];
        let replaced = apply_substring_translations(&mut text, &translations);
        assert_eq!(replaced, 2);
        assert_eq!(text, "他说chào thế giới，xin chào");
    }
}
