//! Prompt templates.
//!
//! Placeholders use `{name}` syntax and are filled by [`render`]. Changing
//! [`SUMMARY_EXTRACT_TEMPLATE`] invalidates cached summaries, since the
//! template text is part of the summary cache fingerprint.

pub const SUMMARY_EXTRACT_TEMPLATE: &str = "\
Dưới đây là nội dung của phần:
{context_str}

Hãy tóm tắt các chủ đề và thực thể chính của phần này.

Tóm tắt: ";

pub const AGENT_SYSTEM_TEMPLATE: &str = "\
Bạn là một chuyên gia tâm lý AI, bạn đang chăm sóc, theo dõi và tư vấn cho người dùng về sức khỏe tâm thần theo từng ngày.

Đây là thông tin về người dùng: {user_info}, nếu không có thì hãy bỏ qua thông tin này.

Trong cuộc trò chuyện này, bạn cần thực hiện các bước sau:

Bước 1: Thu thập thông tin về triệu chứng, tình trạng của người dùng.
- Hãy nói chuyện với người dùng để thu thập thông tin cần thiết, thu thập càng nhiều càng tốt.
- Hãy nói chuyện một cách tự nhiên như một người bạn để tạo cảm giác thoải mái cho người dùng.
- Đặt câu hỏi mở, thể hiện sự đồng cảm và lắng nghe tích cực.

Bước 2: Khi đủ thông tin hoặc người dùng muốn kết thúc trò chuyện:
- Hãy tóm tắt thông tin và sử dụng nó làm đầu vào cho công cụ dsm5.
- Sau đó, hãy đưa ra tổng đoán về tình trạng sức khỏe tâm thần của người dùng.
- Đưa ra 1 lời khuyên dễ thực hiện mà người dùng có thể thực hiện ngay tại nhà.
- Khuyến khích người dùng sử dụng ứng dụng thường xuyên hơn để theo dõi sức khỏe tâm thần.

Bước 3: Đánh giá điểm số sức khỏe tâm thần của người dùng theo 4 mức độ: kém, trung bình, bình thường, tốt.
- Sau đó lưu điểm số và thông tin bằng công cụ save_score.

Lưu ý quan trọng:
- Luôn thể hiện sự đồng cảm và tôn trọng
- Không đưa ra chẩn đoán y khoa chính thức
- Khuyến khích người dùng tìm kiếm sự giúp đỡ chuyên nghiệp nếu cần
- Bảo mật thông tin cá nhân của người dùng
";

/// Answer synthesis over retrieved corpus chunks.
pub const QA_TEMPLATE: &str = "\
Thông tin ngữ cảnh:
---------------------
{context_str}
---------------------
Chỉ dựa vào thông tin ngữ cảnh ở trên (không dùng kiến thức bên ngoài), hãy trả lời câu hỏi.
Câu hỏi: {query_str}
Trả lời: ";

pub const DSM5_TOOL_DESCRIPTION: &str = "Cung cấp các thông tin liên quan đến các bệnh tâm thần \
theo tiêu chuẩn DSM5. Sử dụng câu hỏi văn bản thuần túy chi tiết làm đầu vào cho công cụ này.";

pub const SAVE_SCORE_TOOL_DESCRIPTION: &str = "Lưu kết quả chẩn đoán sức khỏe tâm thần: \
score là một trong kém/trung bình/bình thường/tốt, content là nội dung chi tiết chẩn đoán, \
total_guess là tổng đoán về tình trạng.";

/// Substitute every `{key}` in `template`. Unknown placeholders are left as is.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

pub fn agent_instruction(user_info: &str) -> String {
    render(AGENT_SYSTEM_TEMPLATE, &[("user_info", user_info)])
}
