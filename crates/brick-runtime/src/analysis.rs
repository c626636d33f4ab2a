//! Static pipeline analysis
//!
//! Walks a pipeline and every nested pipeline reachable through pipeline
//! slots without running anything. Annotations point at config fields with
//! dotted positions such as `pipeline.0.config.body.__value__.1.id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};

use brick_core::{BrickKind, Expression, InstanceId, Pipeline, INPUT_KEY, OPTIONS_KEY};
use brick_expr::root_variable;

use crate::registry::BrickRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    DuplicateInstanceId,
    UnknownBrick,
    InvalidExpression,
    MisplacedPipeline,
    UndefinedVariable,
    RendererNotLast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub position: String,
    pub message: String,
    pub level: AnnotationLevel,
    pub kind: AnnotationKind,
}

impl Annotation {
    fn error(position: impl Into<String>, kind: AnnotationKind, message: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            message: message.into(),
            level: AnnotationLevel::Error,
            kind,
        }
    }

    fn warning(position: impl Into<String>, kind: AnnotationKind, message: impl Into<String>) -> Self {
        Self {
            level: AnnotationLevel::Warning,
            ..Self::error(position, kind, message)
        }
    }
}

pub fn analyze_pipeline(pipeline: &Pipeline, registry: &BrickRegistry) -> Vec<Annotation> {
    let mut analyzer = Analyzer {
        registry,
        seen: HashSet::new(),
        annotations: Vec::new(),
    };
    let scope = BTreeSet::from([INPUT_KEY.to_string(), OPTIONS_KEY.to_string()]);
    analyzer.visit_pipeline(pipeline, "pipeline", scope);
    analyzer.annotations
}

/// True when `annotations` contain anything that would fail a run
pub fn has_errors(annotations: &[Annotation]) -> bool {
    annotations
        .iter()
        .any(|annotation| annotation.level == AnnotationLevel::Error)
}

struct Analyzer<'r> {
    registry: &'r BrickRegistry,
    seen: HashSet<InstanceId>,
    annotations: Vec<Annotation>,
}

/// Where pipeline expressions are allowed while walking a config
struct Slots<'s> {
    /// `None` when the brick is unknown and anything goes
    allowed: Option<&'static [&'static str]>,
    scope: &'s BTreeSet<String>,
}

impl Analyzer<'_> {
    fn visit_pipeline(&mut self, pipeline: &Pipeline, position: &str, mut scope: BTreeSet<String>) {
        let registry = self.registry;
        let last = pipeline.len().saturating_sub(1);

        for (index, step) in pipeline.iter().enumerate() {
            let step_position = format!("{position}.{index}");

            if !self.seen.insert(step.instance_id) {
                self.annotations.push(Annotation::error(
                    format!("{step_position}.instanceId"),
                    AnnotationKind::DuplicateInstanceId,
                    format!("instance id {} is used more than once", step.instance_id),
                ));
            }

            let entry = registry.lookup(&step.id);
            match entry {
                None => self.annotations.push(Annotation::error(
                    format!("{step_position}.id"),
                    AnnotationKind::UnknownBrick,
                    format!("brick {} is not registered", step.id),
                )),
                Some(entry) if entry.kind == BrickKind::Renderer && index != last => {
                    self.annotations.push(Annotation::warning(
                        step_position.clone(),
                        AnnotationKind::RendererNotLast,
                        format!("renderer {} should be the last step", step.id),
                    ))
                }
                Some(_) => {}
            }

            if let Some(condition) = &step.condition {
                let no_slots = Slots {
                    allowed: Some(&[]),
                    scope: &scope,
                };
                self.visit_value(condition, &format!("{step_position}.if"), &scope, &no_slots);
            }

            let mut nested_scope = scope.clone();
            if let Some(entry) = entry {
                nested_scope.extend(
                    entry
                        .brick
                        .pipeline_bindings(&step.config)
                        .into_iter()
                        .map(|name| {
                            if name.starts_with('@') {
                                name
                            } else {
                                format!("@{name}")
                            }
                        }),
                );
            }
            let slots = Slots {
                allowed: entry.map(|entry| entry.brick.pipeline_slots()),
                scope: &nested_scope,
            };
            self.visit_config(&step.config, &format!("{step_position}.config"), &scope, &slots);

            if let Some(key) = &step.output_key {
                scope.insert(key.context_key());
            }
        }
    }

    fn visit_config(&mut self, config: &Value, position: &str, scope: &BTreeSet<String>, slots: &Slots<'_>) {
        let Value::Object(fields) = config else {
            self.visit_value(config, position, scope, slots);
            return;
        };
        if Expression::is_expression(config) {
            self.visit_value(config, position, scope, slots);
            return;
        }

        for (field, value) in fields {
            let field_position = format!("{position}.{field}");
            let in_slot = slots
                .allowed
                .is_some_and(|allowed| allowed.contains(&field.as_str()));

            match Expression::detect(value) {
                Some(Ok(Expression::Pipeline(pipeline))) if in_slot => {
                    self.visit_pipeline(
                        &pipeline,
                        &format!("{field_position}.__value__"),
                        slots.scope.clone(),
                    );
                }
                _ => self.visit_value(value, &field_position, scope, slots),
            }
        }
    }

    fn visit_value(&mut self, value: &Value, position: &str, scope: &BTreeSet<String>, slots: &Slots<'_>) {
        match Expression::detect(value) {
            Some(Err(error)) => self.annotations.push(Annotation::error(
                position,
                AnnotationKind::InvalidExpression,
                error.to_string(),
            )),
            Some(Ok(Expression::Var(path))) => {
                let defined = root_variable(&path).is_some_and(|name| scope.contains(&name));
                if !defined {
                    self.annotations.push(Annotation::warning(
                        position,
                        AnnotationKind::UndefinedVariable,
                        format!("{} is not defined at this point", path.trim()),
                    ));
                }
            }
            Some(Ok(Expression::Pipeline(pipeline))) => {
                if slots.allowed.is_some() {
                    self.annotations.push(Annotation::error(
                        position,
                        AnnotationKind::MisplacedPipeline,
                        "pipeline expressions are only allowed in pipeline slots",
                    ));
                }
                self.visit_pipeline(&pipeline, &format!("{position}.__value__"), scope.clone());
            }
            Some(Ok(_)) => {}
            None => match value {
                Value::Object(map) => {
                    for (key, member) in map {
                        self.visit_value(member, &format!("{position}.{key}"), scope, slots);
                    }
                }
                Value::Array(items) => {
                    for (index, item) in items.iter().enumerate() {
                        self.visit_value(item, &format!("{position}.{index}"), scope, slots);
                    }
                }
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brick_core::{Brick, BrickConfig, BrickOptions, PipelineError};
    use serde_json::json;
    use std::sync::Arc;

    struct Plain(&'static str, BrickKind);

    #[async_trait]
    impl Brick for Plain {
        fn id(&self) -> &str {
            self.0
        }

        fn kind(&self) -> BrickKind {
            self.1
        }

        async fn run(&self, args: Value, _: BrickOptions<'_>) -> Result<Value, PipelineError> {
            Ok(args)
        }
    }

    struct Loop;

    #[async_trait]
    impl Brick for Loop {
        fn id(&self) -> &str {
            "test/loop"
        }

        fn kind(&self) -> BrickKind {
            BrickKind::Transform
        }

        fn pipeline_slots(&self) -> &'static [&'static str] {
            &["body"]
        }

        fn pipeline_bindings(&self, _: &Value) -> Vec<String> {
            vec!["element".to_string()]
        }

        async fn run(&self, _: Value, _: BrickOptions<'_>) -> Result<Value, PipelineError> {
            Ok(Value::Null)
        }
    }

    fn registry() -> BrickRegistry {
        let mut registry = BrickRegistry::new();
        registry.register(Arc::new(Plain("test/echo", BrickKind::Transform)));
        registry.register(Arc::new(Plain("test/render", BrickKind::Renderer)));
        registry.register(Arc::new(Loop));
        registry
    }

    fn echo(message: Value) -> BrickConfig {
        BrickConfig::new("test/echo", json!({ "message": message }))
    }

    #[test]
    fn test_clean_pipeline() {
        let pipeline = Pipeline::new(vec![
            echo(Expression::var("@input.msg").to_value())
                .try_output_key("out")
                .unwrap(),
            echo(Expression::var("@out.message").to_value()),
            BrickConfig::new("test/render", json!({})),
        ]);
        assert!(analyze_pipeline(&pipeline, &registry()).is_empty());
    }

    #[test]
    fn test_unknown_brick_and_duplicate_id() {
        let step = BrickConfig::new("test/nope", json!({}));
        let pipeline = Pipeline::new(vec![step.clone(), step]);
        let annotations = analyze_pipeline(&pipeline, &registry());

        let kinds: Vec<_> = annotations.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AnnotationKind::UnknownBrick,
                AnnotationKind::DuplicateInstanceId,
                AnnotationKind::UnknownBrick,
            ]
        );
        assert_eq!(annotations[0].position, "pipeline.0.id");
        assert!(has_errors(&annotations));
    }

    #[test]
    fn test_undefined_variable_before_binding() {
        let pipeline = Pipeline::new(vec![
            echo(Expression::var("@later").to_value()),
            echo(json!("x")).try_output_key("later").unwrap(),
        ]);
        let annotations = analyze_pipeline(&pipeline, &registry());

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].kind, AnnotationKind::UndefinedVariable);
        assert_eq!(annotations[0].level, AnnotationLevel::Warning);
        assert_eq!(annotations[0].position, "pipeline.0.config.message");
        assert!(!has_errors(&annotations));
    }

    #[test]
    fn test_nested_pipeline_positions_and_bindings() {
        let body = Pipeline::new(vec![
            echo(Expression::var("@element").to_value()),
            echo(Expression::var("@missing").to_value()),
        ]);
        let pipeline = Pipeline::new(vec![BrickConfig::new(
            "test/loop",
            json!({ "body": Expression::pipeline(body).to_value() }),
        )]);
        let annotations = analyze_pipeline(&pipeline, &registry());

        assert_eq!(annotations.len(), 1);
        assert_eq!(
            annotations[0].position,
            "pipeline.0.config.body.__value__.1.config.message"
        );
    }

    #[test]
    fn test_misplaced_pipeline() {
        let body = Pipeline::new(vec![echo(json!("x"))]);
        let pipeline = Pipeline::new(vec![echo(Expression::pipeline(body).to_value())]);
        let annotations = analyze_pipeline(&pipeline, &registry());

        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].kind, AnnotationKind::MisplacedPipeline);
        assert_eq!(annotations[0].position, "pipeline.0.config.message");
    }

    #[test]
    fn test_renderer_not_last() {
        let pipeline = Pipeline::new(vec![
            BrickConfig::new("test/render", json!({})),
            echo(json!("x")),
        ]);
        let annotations = analyze_pipeline(&pipeline, &registry());
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].kind, AnnotationKind::RendererNotLast);
        assert_eq!(annotations[0].position, "pipeline.0");
    }
}
