//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象，用于封装不可变的概念性值与校验逻辑。
//!
use cqrs_macros::value_object;
use std::fmt;

/// 值对象抽象
pub trait ValueObject {
    /// 业务校验失败时的错误类型
    type Error;

    /// 创建值对象时进行验证
    fn validate(&self) -> Result<(), Self::Error>;
}

/// 聚合版本号
///
/// 一个事件批次对应一个版本：版本 `n` 表示聚合已经持久化了 `n` 个批次，
/// `0` 表示尚未持久化任何事件。
///
/// ```
/// use cqrs_domain::value_object::Version;
///
/// let v0 = Version::new();
/// assert!(v0.is_new());
///
/// let v1 = v0.next();
/// assert!(v1.follows(v0));
/// assert_eq!(v1.to_string(), "v1");
/// ```
#[value_object(copy, ordered)]
pub struct Version(usize);

impl Version {
    /// 初始版本（0）
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn from_value(value: usize) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 上一个版本，初始版本返回 `None`
    pub fn previous(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }

    pub const fn value(&self) -> usize {
        self.0
    }

    pub fn is_new(&self) -> bool {
        self.0 == 0
    }

    /// 是否恰好为 `other` 的下一个版本
    pub fn follows(&self, other: Version) -> bool {
        self.0 == other.0 + 1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<usize> for Version {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<Version> for usize {
    fn from(version: Version) -> Self {
        version.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_and_previous() {
        let v = Version::from_value(3);
        assert_eq!(v.next().value(), 4);
        assert_eq!(v.previous(), Some(Version::from_value(2)));
        assert_eq!(Version::new().previous(), None);
    }

    #[test]
    fn follows_only_immediate_successor() {
        let v1 = Version::from_value(1);
        assert!(Version::from_value(2).follows(v1));
        assert!(!Version::from_value(3).follows(v1));
        assert!(!v1.follows(v1));
    }

    #[test]
    fn serde_is_transparent_number() {
        let v = Version::from_value(7);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "7");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
