//! Explain-plan parsing and recommendation tips: treated as a
//! pure library collaborator. The engine only calls `ExplainParser`; it
//! never inspects plan JSON itself.

use serde::Deserialize;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Tip {
    pub name: String,
    pub description: String,
    pub url: String,
}

/// A parsed `EXPLAIN (ANALYZE, FORMAT JSON)` result.
pub trait Explain: Send + Sync {
    fn render_text(&self) -> String;
    fn tips(&self) -> Vec<Tip>;
    fn render_stats(&self) -> String;
}

pub trait ExplainParser: Send + Sync {
    fn parse(&self, json: &str) -> Result<Box<dyn Explain>, EngineError>;
}

#[derive(Debug, Deserialize)]
struct PlanNode {
    #[serde(rename = "Node Type")]
    node_type: String,
    #[serde(rename = "Total Cost", default)]
    total_cost: f64,
    #[serde(rename = "Actual Total Time", default)]
    actual_total_time: Option<f64>,
    #[serde(rename = "Actual Rows", default)]
    actual_rows: Option<i64>,
    #[serde(rename = "Plans", default)]
    plans: Vec<PlanNode>,
    #[serde(rename = "Relation Name", default)]
    relation_name: Option<String>,
    #[serde(rename = "Filter", default)]
    filter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanEnvelope {
    #[serde(rename = "Plan")]
    plan: PlanNode,
    #[serde(rename = "Execution Time", default)]
    execution_time: Option<f64>,
    #[serde(rename = "Planning Time", default)]
    planning_time: Option<f64>,
}

/// A small, real (not stubbed) explain-analyze JSON parser, enough to
/// make `explain`/`plan` produce non-stub output and satisfy testable
/// property 8 — a full cost-model-aware optimizer is out of scope
/// it is not a query executor or optimizer.
pub struct JsonExplain {
    root: PlanNode,
    execution_time: Option<f64>,
    planning_time: Option<f64>,
}

impl JsonExplain {
    fn walk(node: &PlanNode, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push_str(&node.node_type);
        if let Some(rel) = &node.relation_name {
            out.push_str(" on ");
            out.push_str(rel);
        }
        out.push_str(&format!(" (cost={:.2})", node.total_cost));
        if let Some(t) = node.actual_total_time {
            out.push_str(&format!(" (actual time={t:.3} rows={})", node.actual_rows.unwrap_or(0)));
        }
        out.push('\n');
        for child in &node.plans {
            Self::walk(child, depth + 1, out);
        }
    }

    /// Flags sequential scans over a filtered, presumably large relation
    /// as index-candidate tips — a deliberately simple heuristic matching
    /// an optimizer-style recommendations framing, not a
    /// full cost-based advisor.
    fn collect_tips(node: &PlanNode, out: &mut Vec<Tip>) {
        if node.node_type == "Seq Scan" && node.filter.is_some() {
            let rel = node.relation_name.clone().unwrap_or_else(|| "?".to_string());
            out.push(Tip {
                name: "seqScan".to_string(),
                description: format!("Sequential scan on `{rel}` with a filter; consider an index"),
                url: "https://postgres.ai/docs/joe-bot/tips/seq-scan".to_string(),
            });
        }
        for child in &node.plans {
            Self::collect_tips(child, out);
        }
    }
}

pub struct JsonExplainParser;

impl ExplainParser for JsonExplainParser {
    fn parse(&self, json: &str) -> Result<Box<dyn Explain>, EngineError> {
        let envelopes: Vec<PlanEnvelope> =
            serde_json::from_str(json).map_err(|e| EngineError::Query(format!("invalid explain json: {e}")))?;

        let envelope = envelopes
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Query("explain json contained no plan".to_string()))?;

        Ok(Box::new(JsonExplain {
            root: envelope.plan,
            execution_time: envelope.execution_time,
            planning_time: envelope.planning_time,
        }))
    }
}

impl Explain for JsonExplain {
    fn render_text(&self) -> String {
        let mut out = String::new();
        JsonExplain::walk(&self.root, 0, &mut out);
        out
    }

    fn tips(&self) -> Vec<Tip> {
        let mut tips = Vec::new();
        JsonExplain::collect_tips(&self.root, &mut tips);
        tips
    }

    fn render_stats(&self) -> String {
        format!(
            "Planning Time: {:.3} ms\nExecution Time: {:.3} ms",
            self.planning_time.unwrap_or(0.0),
            self.execution_time.unwrap_or(0.0)
        )
    }
}

/// Renders a tip list the way the original's `Explain` command message
/// builder does: `":exclamation: {name} – {description} <{url}|Show
/// details>"` per tip, or the literal `":white_check_mark: Looks good"`
/// when there are none (asserted verbatim in scenario S2).
pub fn render_recommendations(tips: &[Tip]) -> String {
    if tips.is_empty() {
        return ":white_check_mark: Looks good".to_string();
    }

    tips.iter()
        .map(|t| format!(":exclamation: {} – {} <{}|Show details>", t.name, t.description, t.url))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[{
        "Plan": {
            "Node Type": "Result",
            "Total Cost": 0.01,
            "Actual Total Time": 0.002,
            "Actual Rows": 1,
            "Plans": []
        },
        "Planning Time": 0.05,
        "Execution Time": 0.01
    }]"#;

    #[test]
    fn parses_a_trivial_plan() {
        let explain = JsonExplainParser.parse(SAMPLE).unwrap();
        assert!(explain.render_text().contains("Result"));
        assert!(explain.render_stats().contains("Planning Time"));
        assert!(explain.tips().is_empty());
    }

    #[test]
    fn empty_tips_render_looks_good() {
        assert_eq!(render_recommendations(&[]), ":white_check_mark: Looks good");
    }

    #[test]
    fn seq_scan_with_filter_produces_a_tip() {
        let json = r#"[{
            "Plan": {
                "Node Type": "Seq Scan",
                "Relation Name": "orders",
                "Total Cost": 500.0,
                "Filter": "status = 'shipped'",
                "Plans": []
            }
        }]"#;
        let explain = JsonExplainParser.parse(json).unwrap();
        let tips = explain.tips();
        assert_eq!(tips.len(), 1);
        assert!(render_recommendations(&tips).contains(":exclamation:"));
    }
}
