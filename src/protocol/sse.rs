use futures::stream::{self, Stream, StreamExt};
use tracing::warn;

use super::types::StreamableResponse;
use crate::error::{Result, StageFlowError};

pub const DONE_SENTINEL: &str = "[DONE]";

/// 编码单个片段：`data: <json>\n\n`
pub fn encode_fragment(fragment: &StreamableResponse) -> Result<String> {
    let json = serde_json::to_string(fragment)?;
    Ok(format!("data: {json}\n\n"))
}

pub fn encode_done() -> String {
    format!("data: {DONE_SENTINEL}\n\n")
}

/// 把片段流编码为 SSE 帧，并在末尾追加结束标记
pub fn encode_stream<S>(fragments: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = StreamableResponse> + Send,
{
    fragments
        .filter_map(|fragment| async move {
            match encode_fragment(&fragment) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(error = %err, "dropping fragment that failed to encode");
                    None
                }
            }
        })
        .chain(stream::once(async { encode_done() }))
}

#[derive(Clone, Debug, PartialEq)]
pub enum SseEvent {
    Fragment(Box<StreamableResponse>),
    Done,
}

/// 增量 SSE 解析器
///
/// 输入可以在任意字节边界切分（包括多字节字符内部），
/// 缓冲区保存原始字节，只有完整的事件才解码为 UTF-8。
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

fn event_boundary(bytes: &[u8]) -> Option<usize> {
    bytes.windows(2).position(|pair| pair == b"\n\n")
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, data: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(data);

        let mut events = Vec::new();
        while let Some(end) = event_boundary(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = std::str::from_utf8(&raw[..end])
                .map_err(|err| StageFlowError::Serialization(format!("invalid SSE encoding: {err}")))?;
            if let Some(event) = Self::parse_event(text)? {
                if event == SseEvent::Done {
                    self.finished = true;
                }
                events.push(event);
            }
        }
        Ok(events)
    }

    fn parse_event(event_text: &str) -> Result<Option<SseEvent>> {
        // 多行 data 按规范以换行拼接；注释行和其它字段忽略
        let data: Vec<&str> = event_text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();
        if data.is_empty() {
            return Ok(None);
        }
        let payload = data.join("\n");
        if payload.trim() == DONE_SENTINEL {
            return Ok(Some(SseEvent::Done));
        }

        let fragment: StreamableResponse = serde_json::from_str(&payload)
            .map_err(|err| StageFlowError::Serialization(format!("invalid SSE payload: {err}: {payload}")))?;
        Ok(Some(SseEvent::Fragment(Box::new(fragment))))
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.finished = false;
    }
}
