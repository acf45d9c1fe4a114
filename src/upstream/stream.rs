//! # 上游增量更新流的归一化
//!
//! 上游补全响应是行式事件流：`event:` 行声明事件名，`data:` 行携带
//! 若干种补丁操作形态。语义上它们大多是"向当前活跃通道追加文本"，
//! 但后续消息往往省略通道标签，依赖先前片段声明的通道。因此翻译器
//! 必须把"当前通道"作为实例上的显式粘性状态维护，而不是逐行推导。
//!
//! 解码失败的行一律静默跳过——上游格式未文档化且可能漂移，尽力
//! 解码是设计核心，解析错误从不致命。

use bytes::BytesMut;
use serde_json::Value;

/// 文本所属的逻辑通道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// 内部推理文本（`THINK` 片段）
    Reasoning,
    /// 最终回答文本
    Content,
}

/// 归一化后的流事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// 推理通道文本
    Reasoning(String),
    /// 回答通道文本
    Content(String),
    /// 终结事件，每个响应恰好一次
    Done {
        message_id: Option<String>,
        session_id: String,
    },
}

/// 上游行式补丁协议 → 归一化事件序列的有状态解析器
///
/// 输入为任意边界切分的字节块；内部维护未完整行的累积缓冲、
/// 粘性通道标志与最近一次出现的消息 id。
#[derive(Debug)]
pub struct StreamTranslator {
    session_id: String,
    buffer: BytesMut,
    current_event: Option<String>,
    channel: Channel,
    message_id: Option<String>,
    done_emitted: bool,
}

impl StreamTranslator {
    /// 为一次会话响应创建翻译器
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            buffer: BytesMut::new(),
            current_event: None,
            channel: Channel::Content,
            message_id: None,
            done_emitted: false,
        }
    }

    /// 是否已经产出终结事件
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done_emitted
    }

    /// 送入一个字节块，返回其中完整行产出的全部事件
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line_bytes = self.buffer.split_to(pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.ends_with(b"\r") {
                line_bytes.truncate(line_bytes.len() - 1);
            }
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            self.process_line(line.trim(), &mut events);
        }

        events
    }

    /// 流结束时处理缓冲区中残留的最后一行
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let remaining = self.buffer.split_to(self.buffer.len());
            let line = String::from_utf8_lossy(&remaining).into_owned();
            self.process_line(line.trim(), &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        if let Some(name) = line.strip_prefix("event: ") {
            self.current_event = Some(name.to_string());
            return;
        }

        let Some(payload) = line.strip_prefix("data: ") else {
            return;
        };

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.classify(&value, events),
            Err(err) => {
                // 尽力解码：畸形行跳过，不影响前后有效行
                tracing::debug!(error = %err, "skipping malformed upstream data line");
            }
        }
    }

    /// 按优先级对补丁形态分类并产出事件
    ///
    /// 各分支首个命中即返回，与上游观察到的重叠形态互斥处理，
    /// 同一行不会重复产出。
    fn classify(&mut self, value: &Value, events: &mut Vec<StreamEvent>) {
        // 初始消息信封：内嵌响应描述，携带消息 id 与初始片段列表
        if let Some(response) = value.get("v").and_then(|v| v.get("response")) {
            if let Some(id) = response.get("message_id").and_then(Value::as_str) {
                self.message_id = Some(id.to_string());
            }
            if let Some(fragments) = response.get("fragments").and_then(Value::as_array) {
                self.handle_fragments(fragments, events);
            }
            return;
        }

        let path = value.get("p").and_then(Value::as_str);
        let op = value.get("o").and_then(Value::as_str);

        // 批量子操作集合
        if path == Some("response") && op == Some("BATCH") {
            if let Some(ops) = value.get("v").and_then(Value::as_array) {
                for sub in ops {
                    let sub_path = sub.get("p").and_then(Value::as_str);
                    let sub_op = sub.get("o").and_then(Value::as_str);
                    if sub_path == Some("fragments")
                        && sub_op == Some("APPEND")
                        && let Some(fragments) = sub.get("v").and_then(Value::as_array)
                    {
                        self.handle_fragments(fragments, events);
                    }
                    // FINISHED 状态内联产出终结事件，不等待后续行
                    if sub_path == Some("status")
                        && sub.get("v").and_then(Value::as_str) == Some("FINISHED")
                    {
                        self.emit_done(events);
                    }
                }
            }
            return;
        }

        // 独立的片段追加操作
        if path == Some("response/fragments")
            && op == Some("APPEND")
            && let Some(fragments) = value.get("v").and_then(Value::as_array)
        {
            self.handle_fragments(fragments, events);
            return;
        }

        // 裸文本追加（无片段包装），沿用当前活跃通道
        if path.is_some()
            && op == Some("APPEND")
            && let Some(text) = value.get("v").and_then(Value::as_str)
        {
            self.emit_text(text, events);
            return;
        }

        // 按路径寻址的内容替换（无操作标记）
        if op.is_none()
            && path.is_some_and(|p| p.contains("/content"))
            && let Some(text) = value.get("v").and_then(Value::as_str)
        {
            self.emit_text(text, events);
            return;
        }

        // 仅有文本值，无路径/操作标记
        if path.is_none()
            && op.is_none()
            && let Some(text) = value.get("v").and_then(Value::as_str)
        {
            self.emit_text(text, events);
            return;
        }

        // 形态未识别：若当前事件上下文为 finish 则视为终结信号
        if self.current_event.as_deref() == Some("finish") {
            self.emit_done(events);
        }
    }

    /// 片段列表：每个片段更新粘性通道，携带文本时产出对应事件
    fn handle_fragments(&mut self, fragments: &[Value], events: &mut Vec<StreamEvent>) {
        for fragment in fragments {
            self.channel = match fragment.get("type").and_then(Value::as_str) {
                Some("THINK") => Channel::Reasoning,
                _ => Channel::Content,
            };
            if let Some(content) = fragment.get("content").and_then(Value::as_str)
                && !content.is_empty()
            {
                self.emit_text(content, events);
            }
        }
    }

    fn emit_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        let event = match self.channel {
            Channel::Reasoning => StreamEvent::Reasoning(text.to_string()),
            Channel::Content => StreamEvent::Content(text.to_string()),
        };
        events.push(event);
    }

    /// 产出终结事件；内联 FINISHED 与尾随 finish 事件是同一终结的
    /// 两种互斥观察，这里保证整个响应只报告一次
    fn emit_done(&mut self, events: &mut Vec<StreamEvent>) {
        if self.done_emitted {
            return;
        }
        self.done_emitted = true;
        events.push(StreamEvent::Done {
            message_id: self.message_id.clone(),
            session_id: self.session_id.clone(),
        });
    }
}
