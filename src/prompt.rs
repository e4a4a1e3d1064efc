//! Prompt 模板：初始化、章节翻译、残留汉字修补
//!
//! 模板占位符形如 `{name}`，单遍填充：填入的内容不会再被当作占位符展开。模板措辞面向 Agent，使用越南语。

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::context::{ContextSections, NO_DATA};

const INIT_TEMPLATE: &str = r#"BẠN LÀ MỘT HỆ THỐNG KHỞI TẠO DỮ LIỆU PHÂN TÍCH VĂN HỌC.

**Nhiệm vụ:** Phân tích văn bản của các chương truyện đầu tiên dưới đây và trích xuất thông tin nền tảng để tạo database ban đầu. **KHÔNG DỊCH** các chương này, chỉ trích xuất dữ liệu.

**Yêu cầu đầu ra:** Phản hồi PHẢI tuân thủ nghiêm ngặt cấu trúc dưới đây. KHÔNG thêm lời chào hay giải thích nào khác.

[START_DATA_BLOCK]

[SECTION:METADATA]
story_context: [Tóm tắt bối cảnh truyện trong 3 đến 4 câu]
narrative_perspective: [Ngôi kể]
main_char_pronouns: [Cách nhân vật chính tự xưng và xưng hô với người khác]
[END_SECTION]

[SECTION:GLOSSARY]
# Định dạng: Tên Gốc (Pinyin) | Tên Dịch | Ghi Chú
[Mỗi nhân vật một dòng]
[END_SECTION]

[SECTION:RELATIONSHIPS]
# Định dạng: Nhân vật 1 (Tên dịch) | Nhân vật 2 (Tên dịch) | Loại quan hệ
[Mỗi mối quan hệ một dòng]
[END_SECTION]

[END_DATA_BLOCK]

---
### **VĂN BẢN GỐC CẦN PHÂN TÍCH:**

{chapter_blocks}"#;

const TRANSLATION_TEMPLATE: &str = r#"**BẠN LÀ MỘT DỊCH GIẢ VĂN HỌC TRUNG-VIỆT GIÀU KINH NGHIỆM.**

Nhiệm vụ: (1) Dịch chương truyện với chất lượng văn học cao nhất. (2) Trích xuất thông tin mới để cập nhật database.

---

### **DỮ LIỆU NGỮ CẢNH TỪ DATABASE**

**1. BỐI CẢNH TRUYỆN:**
{metadata_section}

**2. GLOSSARY:**
{glossary_section}

**3. RELATIONSHIPS:**
{relationships_section}

---

### **QUY TRÌNH & ĐỊNH DẠNG ĐẦU RA**

**BƯỚC 1: DỊCH THUẬT**
- Lời văn mượt mà, đúng không khí truyện theo [BỐI CẢNH TRUYỆN]; tránh dịch word-by-word.
- Lời thoại tự nhiên, xưng hô đúng vai vế.
- Tên riêng và thuật ngữ tuân thủ Glossary và Relationships.
- Không để sót bất kỳ ký tự tiếng Trung nào.

**BƯỚC 2: PHÂN TÍCH & TRÍCH XUẤT**
Xác định nhân vật và mối quan hệ mới CHƯA có trong database. Chỉ đề xuất quan hệ khi chương hiện tại nhắc tới cả hai nhân vật.

**BƯỚC 3: ĐỊNH DẠNG ĐẦU RA**
Bản dịch, sau đó là khối `[DATABASE_UPDATES]` (nếu cần):

[DATABASE_UPDATES]
[GLOSSARY_ADDITIONS]
Tên Gốc | Tên Dịch | Ghi Chú
[END_GLOSSARY_ADDITIONS]

[RELATIONSHIP_ADDITIONS]
Nhân vật 1 (Tên dịch) | Nhân vật 2 (Tên dịch) | Loại quan hệ
[END_RELATIONSHIP_ADDITIONS]
[/DATABASE_UPDATES]

---

### **VĂN BẢN GỐC CẦN XỬ LÝ:**

{source_text}"#;

const REPAIR_TEMPLATE: &str = r#"Tôi đang hoàn thiện bản dịch tiếng Việt của một chương truyện. Các cụm tiếng Trung dưới đây vẫn còn sót lại trong bản dịch. Hãy dịch mỗi cụm sang tiếng Việt tự nhiên, phù hợp văn cảnh.

YÊU CẦU BẮT BUỘC:
- Giữ nguyên thứ tự các cụm như đã cung cấp.
- Chỉ trả lời mỗi dòng theo định dạng `[tiếng Trung] --> [bản dịch tiếng Việt]`.
- Không thêm ghi chú hay giải thích.

CÁC CỤM CẦN DỊCH:
{sequences}"#;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

/// 一次扫描替换模板中的 `{name}`；未知名字原样保留
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let re = PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap());
    re.replace_all(template, |caps: &Captures<'_>| {
        values
            .iter()
            .find(|(name, _)| *name == &caps[1])
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

fn or_no_data(section: &str) -> &str {
    let trimmed = section.trim();
    if trimmed.is_empty() {
        NO_DATA
    } else {
        trimmed
    }
}

/// 初始化 prompt：`chapters` 为 (章节名, 原文)
pub fn build_initialisation_prompt(chapters: &[(String, String)]) -> String {
    let blocks = if chapters.is_empty() {
        NO_DATA.to_string()
    } else {
        chapters
            .iter()
            .enumerate()
            .map(|(index, (name, text))| {
                let number = index + 1;
                let name = if name.trim().is_empty() {
                    format!("Chương {number:03}")
                } else {
                    name.clone()
                };
                format!("---\n#### Chương {number:03} - {name}\n\n{}\n", text.trim())
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    fill(INIT_TEMPLATE, &[("chapter_blocks", &blocks)])
}

pub fn build_translation_prompt(context: &ContextSections, source_text: &str) -> String {
    fill(
        TRANSLATION_TEMPLATE,
        &[
            ("metadata_section", or_no_data(&context.metadata)),
            ("glossary_section", or_no_data(&context.glossary)),
            ("relationships_section", or_no_data(&context.relationships)),
            ("source_text", source_text.trim()),
        ],
    )
}

/// 残留汉字修补 prompt：每行一个待译片段
pub fn build_repair_prompt(sequences: &[String]) -> String {
    fill(REPAIR_TEMPLATE, &[("sequences", &sequences.join("\n"))])
}
