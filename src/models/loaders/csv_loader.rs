use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// 一行 CSV 数据（表头 → 值）
pub type CsvRow = BTreeMap<String, String>;

/// 解析后的 CSV 表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

/// 从文件加载 CSV 并解析
pub async fn load_csv(csv_file_path: &Path) -> Result<CsvTable> {
    let content = fs::read_to_string(csv_file_path)
        .await
        .with_context(|| format!("无法读取CSV文件: {}", csv_file_path.display()))?;

    let table = parse_csv(&content);
    tracing::info!(
        "成功加载 {} 行数据 ({} 列)",
        table.rows.len(),
        table.headers.len()
    );
    Ok(table)
}

/// 解析 CSV 文本
///
/// 第一行非空行为表头；空行跳过；支持双引号字段，`""` 表示转义的引号。
/// 缺失的列补为空字符串。
pub fn parse_csv(text: &str) -> CsvTable {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    let headers = match lines.next() {
        Some(line) => parse_row(line),
        None => return CsvTable::default(),
    };
    if headers.is_empty() {
        return CsvTable::default();
    }

    let rows = lines
        .map(|line| {
            let values = parse_row(line);
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    let value = values.get(i).map(|v| v.trim().to_string()).unwrap_or_default();
                    (h.clone(), value)
                })
                .collect()
        })
        .collect();

    CsvTable { headers, rows }
}

fn parse_row(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();

    while chars.peek().is_some() {
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        value.push('"');
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    value.push(c);
                }
            }
            out.push(value);
            while chars.peek() == Some(&' ') {
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            out.push(value.trim().to_string());
        }
        if chars.peek() == Some(&',') {
            chars.next();
            // 行尾的逗号表示最后还有一个空字段
            if chars.peek().is_none() {
                out.push(String::new());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let table = parse_csv(
            "age,tenure,contract\n\n40, 24 ,Month-to-month\r\n35,2,\"One year\"\n",
        );
        assert_eq!(table.headers, vec!["age", "tenure", "contract"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["tenure"], "24");
        assert_eq!(table.rows[1]["contract"], "One year");
    }

    #[test]
    fn handles_escaped_quotes_and_missing_columns() {
        let table = parse_csv("a,b,c\n\"say \"\"hi\"\"\",x\n");
        assert_eq!(table.rows[0]["a"], "say \"hi\"");
        assert_eq!(table.rows[0]["b"], "x");
        assert_eq!(table.rows[0]["c"], "");
    }

    #[test]
    fn empty_input_yields_empty_table() {
        assert_eq!(parse_csv("\n  \n"), CsvTable::default());
    }
}
