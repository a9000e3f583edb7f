//! Prompt rendering for text-generation engines.

use minijinja::{Environment, context};

use crate::model::OptimizationRequest;

const TEMPLATE_NAME: &str = "optimize_prompt.txt";

const TEMPLATE: &str = r#"You are an expert in optimizing Data Lakehouse workloads running on Trino + Iceberg + S3.
Analyze the DDL and the frequently executed SQL queries below.
Propose performance optimizations through:
- denormalizing tables that are frequently joined
- partitioning by date or another suitable column
- changing column data types
- building flat tables to speed up analytics

RULES:
1. The first DDL statement must be: CREATE SCHEMA <catalog>.<new_schema>
2. Every table must be referenced by its full path: catalog.schema.table
3. Rewrite every query listed below and keep its queryid exactly as given.
4. Return strictly JSON in this format:
{"ddl": [{"statement": "..."}], "migrations": [{"statement": "..."}], "queries": [{"queryid": "...", "query": "..."}]}

DDL:
{% for item in ddl %}{{ item.statement }}
{% endfor %}
Queries:
{% for q in queries %}{{ q.queryid }}: {{ q.query }} (executed {{ q.runquantity }} times)
{% endfor %}
Return only JSON, without explanations.
"#;

/// Renders the optimization prompt for a request.
#[derive(Debug)]
pub struct PromptRenderer {
    env: Environment<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render(&self, request: &OptimizationRequest) -> Result<String, minijinja::Error> {
        self.env.get_template(TEMPLATE_NAME)?.render(context! {
            ddl => &request.ddl,
            queries => &request.queries,
        })
    }
}
