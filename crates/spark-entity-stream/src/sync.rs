//
// 教案级说明：`loom` 运行时需要接管互斥锁以枚举调度交错，因此在模型检查配置下
// 切换到 `loom::sync::Mutex`；常规构建使用 `parking_lot::Mutex`。两者经由同一个
// `lock()` 签名暴露，调用点无需区分。`Arc` 保持标准实现，以便继续承载 `dyn Trait`。

#[cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]
pub(crate) use parking_lot::{Mutex, MutexGuard};

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
pub(crate) use self::model::{Mutex, MutexGuard};

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
mod model {
    pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            // 回调从不在持锁期间执行，锁中毒只可能来自测试自身的 panic。
            match self.0.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        }
    }
}
