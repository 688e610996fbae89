//! 工具声明与参数 JSON Schema（schemars 从参数结构体生成）
//!
//! 声明在建会话时随请求下发给远端，让模型按结构产出参数。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde_json::Value;

use super::call::{CreateTaskArgs, RescheduleEventArgs, ToolKind, UpdateTaskStatusArgs};

/// 一个工具的声明：名称、描述、参数 Schema
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// 全部受支持工具的声明，顺序与 ToolKind::ALL 一致
pub fn tool_declarations() -> Vec<ToolDeclaration> {
    ToolKind::ALL
        .into_iter()
        .map(|kind| ToolDeclaration {
            name: kind.name(),
            description: kind.description(),
            parameters: parameters_for(kind),
        })
        .collect()
}

fn parameters_for(kind: ToolKind) -> Value {
    match kind {
        ToolKind::UpdateTaskStatus => parameters_schema::<UpdateTaskStatusArgs>(),
        ToolKind::CreateTask => parameters_schema::<CreateTaskArgs>(),
        ToolKind::RescheduleEvent => parameters_schema::<RescheduleEventArgs>(),
    }
}

/// 内联子 Schema、去掉 $schema / title，得到可直接作为 function parameters 的对象 Schema
fn parameters_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.option_add_null_type = false;
        s.meta_schema = None;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(&root.schema)
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
    }
    value
}
