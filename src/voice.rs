//! 语音边界
//!
//! 播报与转写都是外部协作方：这里只定义窄接口。播报从管线视角是
//! fire-and-forget，失败降级为无操作，绝不作为管线错误上抛。

use async_trait::async_trait;

/// 文本播报接口
#[async_trait]
pub trait Speaker: Send + Sync {
    /// 播报一段文本；实现内部吞掉失败（最多记日志）
    async fn speak(&self, text: &str);
}

/// 空实现：无音频输出环境
#[derive(Clone, Default)]
pub struct NoopSpeaker;

#[async_trait]
impl Speaker for NoopSpeaker {
    async fn speak(&self, _text: &str) {}
}

/// 控制台播报：本地读取循环用
#[derive(Clone, Default)]
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str) {
        println!("{}", text);
    }
}

/// 语音转文本接口（字节进，文本出）；服务端可插拔
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, String>;
}
