//! cqrs-macros：聚合、事件与值对象的属性宏
//!
//! - `#[entity]`：为聚合状态结构体补齐 `id` 字段并实现 `Entity`；
//! - `#[domain_event]`：为事件枚举实现 `DomainEvent`（事件类型名与载荷版本）；
//! - `#[value_object]`：为值对象合并常用派生。
//!
use proc_macro::TokenStream;

mod domain_event;
mod entity;
mod utils;
mod value_object;

/// 实体宏
///
/// - 若缺失则在字段最前追加 `id: IdType`；
/// - 合并派生：`Debug`（可关闭）、`Clone`、`Default`、`Serialize`、`Deserialize`；
/// - 实现 `::cqrs_domain::entity::Entity`（`new/id`）。
///
/// 参数：`#[entity(id = IdType, debug = true|false)]`，`id` 默认为 `String`。
#[proc_macro_attribute]
pub fn entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity::expand(attr, item)
}

/// 领域事件宏
///
/// - 支持单元、元组与具名字段变体；
/// - 合并派生：`Debug`、`Clone`、`PartialEq`、`Serialize`、`Deserialize`；
/// - 实现 `::cqrs_domain::domain_event::DomainEvent`，事件类型默认为 `Enum.Variant`。
///
/// 枚举级参数：`#[domain_event(version = N)]`；
/// 变体级覆写：`#[event(event_type = "...", event_version = N)]`。
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}

/// 值对象宏
///
/// 合并派生：`Debug`（可关闭）、`Clone`、`Default`、`Serialize`、`Deserialize`、
/// `PartialEq`、`Eq`；`copy` 追加 `Copy`，`ordered` 追加 `PartialOrd`、`Ord`、`Hash`。
#[proc_macro_attribute]
pub fn value_object(attr: TokenStream, item: TokenStream) -> TokenStream {
    value_object::expand(attr, item)
}
