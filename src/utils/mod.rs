// 工具函数模块
// 输入校验等通用工具

pub mod validation;

// 重新导出常用函数
pub use validation::*;
