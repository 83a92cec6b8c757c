//! JSON Schema生成ツール
//!
//! src/domain/config.rsの設定構造からJSON Schema（schema/config.json）を
//! 自動生成します。設定項目の説明はconfig.rsのdoc commentsから取られます。
//!
//! 実行方法:
//! ```
//! cargo run --bin generate_schema
//! ```

use rainbow_vision::domain::config::AppConfig;
use schemars::schema_for;
use std::fs;

fn main() {
    println!("JSON Schema生成中...");

    let schema = schema_for!(AppConfig);
    let json = serde_json::to_string_pretty(&schema).expect("Failed to serialize schema to JSON");

    fs::create_dir_all("schema").expect("Failed to create schema/ directory");
    fs::write("schema/config.json", json).expect("Failed to write schema/config.json");

    println!("✅ 生成完了: schema/config.json");
}
