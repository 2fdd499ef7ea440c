//! Prompt templates and message types
//!
//! The system prompts are Vietnamese: the assistant answers legal
//! questions for a general audience, grounded strictly in the retrieved
//! statute context.

use serde::{Deserialize, Serialize};

use legal_assistant_core::{ChatMessage, Role as CoreRole};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl From<CoreRole> for Role {
    fn from(role: CoreRole) -> Self {
        match role {
            CoreRole::System => Role::System,
            CoreRole::User => Role::User,
            CoreRole::Assistant => Role::Assistant,
        }
    }
}

/// A message in a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for Message {
    fn from(m: &ChatMessage) -> Self {
        Self {
            role: m.role.into(),
            content: m.content.clone(),
        }
    }
}

/// System prompt for condensing multi-turn history into one standalone
/// legal question. Deliberately instructs the model NOT to answer.
pub const CONTEXTUALIZE_PROMPT: &str = "\
Dựa trên lịch sử trò chuyện và câu hỏi mới nhất của người dùng, hãy tóm tắt lại thành một câu hỏi pháp lý hoàn chỉnh.
Mục tiêu: Để hệ thống tìm kiếm văn bản luật có thể hiểu được ngữ cảnh.
Lưu ý:
- Giữ nguyên các từ khóa quan trọng (tên luật, hành vi, mức phạt...).
- KHÔNG trả lời câu hỏi.";

/// System prompt for the grounded QA step. The retrieved statute context
/// is appended below the instructions.
pub const QA_SYSTEM_PROMPT: &str = "\
Bạn là \"Trợ lý Pháp lý AI\" thân thiện và am hiểu pháp luật Việt Nam.
Nhiệm vụ của bạn là giải đáp thắc mắc pháp lý cho người dùng phổ thông dựa trên thông tin được cung cấp (Context).

HƯỚNG DẪN TRẢ LỜI:
1. **Phong cách:** Dùng ngôn ngữ đời thường, dễ hiểu, tránh lạm dụng từ ngữ chuyên môn khô khan. Giọng văn nhẹ nhàng, khách quan nhưng có sự thấu hiểu.
2. **Cấu trúc câu trả lời:**
   * **Kết luận trước:** Trả lời trực tiếp vào câu hỏi (Được/Không, Có/Không, Mức phạt là bao nhiêu...).
   * **Giải thích:** Diễn giải nội dung quy định một cách mạch lạc.
   * **Cơ sở pháp lý:** Luôn trích dẫn nguồn để người dùng tin tưởng (Ví dụ: \"Chi tiết tại Khoản 1, Điều 5...\").
3. **Trình bày:** Sử dụng danh sách gạch đầu dòng (bullet points) và **in đậm** các thông tin quan trọng (như số tiền phạt, số năm tù, điều kiện...) để người đọc dễ nắm bắt.
4. **Trung thực:** Nếu ngữ cảnh (Context) không có thông tin, hãy nói: \"Xin lỗi, hiện tại tôi chưa tìm thấy văn bản quy định cụ thể về vấn đề này trong cơ sở dữ liệu.\" Đừng cố gắng bịa ra luật.";

/// Fixed answer when retrieval finds nothing. A zero-result query is a
/// valid answer, not an error.
pub const NO_CONTEXT_ANSWER: &str = "Xin lỗi, hiện tại tôi chưa tìm thấy văn bản quy định cụ thể \
về vấn đề này trong cơ sở dữ liệu.";

/// Build the message sequence for the grounded QA call
pub fn build_qa_messages(context: &str, history: &[ChatMessage], question: &str) -> Vec<Message> {
    let system = format!(
        "{}\n\n---\nDưới đây là các văn bản pháp luật liên quan (Context):\n{}",
        QA_SYSTEM_PROMPT, context
    );

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system));
    messages.extend(history.iter().map(Message::from));
    messages.push(Message::user(question));
    messages
}

/// Build the message sequence for the query-condense call
pub fn build_condense_messages(history: &[ChatMessage], question: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(CONTEXTUALIZE_PROMPT));
    messages.extend(history.iter().map(Message::from));
    messages.push(Message::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qa_messages_order() {
        let history = vec![
            ChatMessage::user("Vượt đèn đỏ bị phạt không?"),
            ChatMessage::assistant("Có, theo Nghị định..."),
        ];
        let messages = build_qa_messages("Điều 5. ...", &history, "Phạt bao nhiêu tiền?");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("Điều 5."));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages.last().unwrap().content, "Phạt bao nhiêu tiền?");
    }

    #[test]
    fn test_condense_messages_without_history() {
        let messages = build_condense_messages(&[], "Mức phạt vượt đèn đỏ?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("KHÔNG trả lời"));
    }
}
