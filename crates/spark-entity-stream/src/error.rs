//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为实体流协议集中定义错误语义：调用方误用（协议违例）、回调失败（投递失败）、
//!   观察者失败与消费端取消四类情形；
//! - 回调失败不以 panic 或调用栈异常的形式跨越生产者/消费者边界，而是被转换为
//!   [`Cause`] 值，随 `error`/`on_error`/`on_abort` 传递。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error`；
//! - [`Cause`] 必须廉价可克隆：同一个失败原因会先投递给全部观察者，再投递给读取端。
//!
//! ## 扩展建议（How）
//! - 上层传输层若需要携带协议特定的错误，可直接 `Cause::new(自定义错误)`，
//!   并在接收侧通过 [`Cause::downcast_ref`] 还原。

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// 调用方违反协议的具体情形，总是同步返回给违例的调用方。
///
/// # 教案式说明
/// - **意图 (Why)**：把“写入超过授信”“终止后继续写入”等误用与运行期失败区分开，
///   违例只影响违例的调用方，不会额外污染流状态。
/// - **契约 (What)**：变体携带的上下文足以定位误用位置；枚举可 `Copy`，便于在测试中直接比较。
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ProtocolViolation {
    /// 读取端已挂载后再次挂载读取端或追加观察者。
    #[error("entity stream had already been initialized and can no longer accept observers or reader")]
    AlreadyInitialized,

    /// 生产者在 `done()`/`error()` 之后继续写入。
    #[error("attempting to write after done or error of write handle is invoked")]
    WriteAfterTerminal,

    /// 写入次数超过消费端授予的信用额度。
    #[error("attempt to write when remaining credit is 0")]
    CreditExceeded,

    /// 消费端请求了非正数个数据项。
    #[error("cannot request non-positive number of data items: {requested}")]
    NonPositiveRequest { requested: u32 },
}

/// 实体流错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：统一承载协议违例、取消条件与回调失败，使日志与测试可以按类别匹配。
/// - **契约 (What)**：
///   - `Violation`：唯一会经由句柄方法 `Result` 返回给调用方的类别；
///   - `Aborted`：消费端取消且没有底层应用错误时合成的原因；
///   - `Delivery`/`Observer`：仅用于日志与 [`Cause`] 包装，永不以 `Err` 形式返回给句柄调用方。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),

    #[error("reader aborted")]
    Aborted,

    #[error("{stage} failed: {cause}")]
    Delivery { stage: &'static str, cause: Cause },

    #[error("observer {stage} failed: {cause}")]
    Observer { stage: &'static str, cause: Cause },
}

impl StreamError {
    /// 若为协议违例则返回具体违例。
    pub fn violation(&self) -> Option<ProtocolViolation> {
        match self {
            StreamError::Violation(violation) => Some(*violation),
            _ => None,
        }
    }
}

/// 配置解析与校验错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse entity stream config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid entity stream config: {field} {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// 终止原因：在 `error`、`on_error`、`on_abort` 之间传递的显式失败值。
///
/// # 教案式说明
/// - **意图 (Why)**：同一个原因需要依次交给多个观察者与读取端，因此以 `Arc` 共享底层错误，
///   克隆仅是一次引用计数递增。
/// - **逻辑 (How)**：内部持有 `Arc<dyn Error + Send + Sync>`；[`Cause::aborted`] 包装
///   [`StreamError::Aborted`]，[`Cause::is_aborted`] 据此识别取消。
/// - **契约 (What)**：`Display` 与 `source()` 透传底层错误，调用方可用 [`Cause::downcast_ref`]
///   取回具体类型。
#[derive(Clone)]
pub struct Cause(Arc<dyn StdError + Send + Sync + 'static>);

impl Cause {
    /// 以任意错误构造原因。
    pub fn new(error: impl StdError + Send + Sync + 'static) -> Self {
        Self(Arc::new(error))
    }

    /// 以一段描述构造原因，适合没有结构化错误类型的回调实现。
    pub fn msg(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(MessageError(message.into()))
    }

    /// 消费端取消时合成的 “reader aborted” 原因。
    pub fn aborted() -> Self {
        Self::new(StreamError::Aborted)
    }

    /// 判断该原因是否为消费端取消。
    pub fn is_aborted(&self) -> bool {
        matches!(
            self.0.downcast_ref::<StreamError>(),
            Some(StreamError::Aborted)
        )
    }

    /// 尝试取回底层错误的具体类型。
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// 判断两个原因是否指向同一个底层错误实例。
    pub fn ptr_eq(&self, other: &Cause) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cause").field(&self.0).finish()
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<ProtocolViolation> for Cause {
    fn from(value: ProtocolViolation) -> Self {
        Cause::new(StreamError::Violation(value))
    }
}

impl From<StreamError> for Cause {
    fn from(value: StreamError) -> Self {
        Cause::new(value)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(Cow<'static, str>);
