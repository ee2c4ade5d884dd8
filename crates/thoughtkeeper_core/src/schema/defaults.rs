//! Canonical default document.
//!
//! The timeline, model connections and tag taxonomy are editorial seed
//! content, loaded verbatim on first access.

use crate::model::document::{Document, Milestone, DATA_VERSION};
use serde_json::Map;
use std::collections::BTreeMap;

pub const DEFAULT_CURRENT_VERSION: &str = "v22.48";
pub const DEFAULT_NEXT_THOUGHT_ID: u64 = 124;
pub const DEFAULT_NEXT_MODEL_ID: u64 = 81;

const SEED_TIMELINE: &[(&str, &str, &str, &str)] = &[
    ("t1", "v1.0-v5.0", "2023-01", "基础情感模型建立（工具化、错位、遗憾）"),
    ("t2", "v6.0-v10.0", "2023-03", "关系模型深化（成熟馈赠、无限博弈）"),
    ("t3", "v11.0-v15.0", "2023-05", "存在哲学拓展（存在勘探、水性智慧）"),
    ("t4", "v16.0-v18.0", "2023-07", "防御机制与病理学完善（梦境寄生、情感麻痹）"),
    ("t5", "v18.0-v20.2", "2023-09", "关系动力学、健康共建、意义整合"),
    ("t6", "v20.3-v21.3", "2023-11", "宏观社会批判、个体生存策略、哲学框架普适化"),
    (
        "t7",
        "v21.4-v22.0",
        "2024-01",
        "亲密关系光谱、存在性寄生、熵增损耗、祛魅悬置、偶像幻灭、创伤后重建、虚无美学整合",
    ),
    ("t8", "v22.1-v22.2", "2024-03", "双轨制架构建立，新增 M-45 至 M-53 模型"),
    ("t9", "v22.33", "2024-05", "《我们很好》×《快乐星猫》关系诊疗整合版"),
    ("t10", "v22.48", "2024-07", "《寄居》×《花》整合版，模型总数达80个"),
];

const SEED_MODEL_CONNECTIONS: &[(&str, &[&str])] = &[
    ("M-80", &["M-74", "M-78", "M-69", "M-77", "M-67"]),
    ("M-79", &["M-77", "M-71", "M-67"]),
    ("M-78", &["M-74", "M-73", "M-77", "M-76"]),
    ("M-77", &["M-69", "M-71", "M-67", "M-76"]),
    ("M-76", &["M-60", "M-71", "M-62", "M-66", "M-74"]),
    ("M-75", &["M-73", "M-72", "M-94"]),
    ("M-74", &["M-69", "M-30", "M-66", "M-67"]),
    ("M-73", &["M-94", "M-70", "M-72", "M-68"]),
];

const SEED_TAG_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "核心模型",
        &["🧠 核心模型", "🌌 哲学/存在智慧", "🔄 系统/模型整合", "⚙️ 决策/行动", "🎭 荒诞/幽默"],
    ),
    (
        "关系与情感",
        &["💞 亲密关系/情感", "💔 失去/告别", "⚖️ 期望/错位", "🌱 成长/历程", "😶 道德/伦理"],
    ),
    (
        "时间与存在",
        &["⏳ 时间/宿命", "⏰ 记忆/遗忘", "🌍 存在/感知", "🌀 循环/重复", "🚶 历程/路径"],
    ),
    (
        "艺术与表达",
        &["🎵 歌曲分析", "🎭 文艺批评", "🎨 艺术/象征", "🗣️ 语言/叙事", "📚 文本分析"],
    ),
    (
        "社会与系统",
        &["⚔️ 反抗/边缘", "🔄 系统/结构", "🏛️ 制度/权力", "🌐 网络/连接", "⚖️ 伦理/责任"],
    ),
    (
        "特殊状态",
        &["🔥 极端体验", "🌀 解构/重构", "🎯 聚焦/专注", "💡 灵感/洞见", "🛡️ 防御/保护"],
    ),
];

/// Builds the canonical first-run document stamped with `now`.
pub fn create_default(now: &str) -> Document {
    Document {
        thoughts: Vec::new(),
        models: Vec::new(),
        tags: BTreeMap::new(),
        tag_categories: string_lists(SEED_TAG_CATEGORIES),
        timeline: SEED_TIMELINE
            .iter()
            .map(|(id, version, date, event)| Milestone::new(id, version, date, event))
            .collect(),
        model_connections: string_lists(SEED_MODEL_CONNECTIONS),
        current_version: DEFAULT_CURRENT_VERSION.to_string(),
        data_version: DATA_VERSION.to_string(),
        next_thought_id: DEFAULT_NEXT_THOUGHT_ID,
        next_model_id: DEFAULT_NEXT_MODEL_ID,
        last_saved: now.to_string(),
        last_modified: now.to_string(),
        created_at: now.to_string(),
        extra: Map::new(),
    }
}

fn string_lists(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|value| value.to_string()).collect(),
            )
        })
        .collect()
}
