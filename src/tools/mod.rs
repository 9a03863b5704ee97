//! 工具能力层
//!
//! 外部动作提供方的统一接口：结构化参数进，结构化结果或 {"error": ...} 出。

pub mod app_launch;
pub mod calendar;
pub mod email;
pub mod file_search;
pub mod registry;

pub use app_launch::AppLaunchTool;
pub use calendar::{
    resolve_timeframe, CalendarEvent, CalendarProvider, InMemoryCalendar, TimeWindow,
};
pub use email::{EmailMessage, EmailProvider, InMemoryMailbox};
pub use file_search::{search_files, FileHit, FileSearchOptions};
pub use registry::{Tool, ToolRegistry};
