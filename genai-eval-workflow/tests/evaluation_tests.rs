use async_trait::async_trait;
use genai_eval_core::*;
use genai_eval_metrics::LocalEvaluationService;
use genai_eval_workflow::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Script = dyn Fn(&EvaluateInstancesRequest) -> std::result::Result<EvaluateInstancesResponse, JudgeError>
    + Send
    + Sync;

/// Judge whose answer is a function of the request.
struct ScriptedJudge {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&EvaluateInstancesRequest) -> std::result::Result<EvaluateInstancesResponse, JudgeError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvaluationService for ScriptedJudge {
    async fn evaluate_instances(
        &self,
        request: EvaluateInstancesRequest,
    ) -> std::result::Result<EvaluateInstancesResponse, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(&request)
    }
}

/// Text of one input variable of a model-based request.
fn instance_field(request: &EvaluateInstancesRequest, field: &str) -> Option<String> {
    let instance = match &request.input {
        EvaluationInput::Pointwise { instance, .. } | EvaluationInput::Pairwise { instance, .. } => {
            instance
        }
        _ => return None,
    };
    let InstanceInput::JsonInstance(text) = instance else {
        return None;
    };
    let map: serde_json::Map<String, Value> = serde_json::from_str(text).ok()?;
    map.get(field)?.as_str().map(str::to_string)
}

fn fast_config() -> EvaluationRunConfig {
    EvaluationRunConfig {
        evaluation_service_qps: 1000.0,
        generation_qps: 1000.0,
        ..Default::default()
    }
}

fn dataset(rows: Value) -> Dataset {
    Dataset::from_json_value(rows).unwrap()
}

fn column(result: &EvalResult, name: &str) -> Vec<Value> {
    result.metrics_table.column_values(name)
}

fn critique(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(q, v)| format!("<question>\nQuestion: {}\nVerdict: {}\n</question>", q, v))
        .collect::<Vec<_>>()
        .join("\n")
}

// ===== Computation Metric Tests =====

#[tokio::test]
async fn test_exact_match_scores_and_summary() {
    let task = EvalTask::builder(
        dataset(json!([
            {"response": "test", "reference": "test"},
            {"response": "text", "reference": "ref"}
        ])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(column(&result, "exact_match/score"), vec![json!(1.0), json!(0.0)]);
    assert_eq!(result.summary_f64("exact_match/mean"), Some(0.5));
    assert_eq!(result.summary_metrics["row_count"], json!(2));
}

#[tokio::test]
async fn test_input_dataset_is_not_mutated() {
    let input = dataset(json!([{"response": "a", "reference": "a"}]));
    let task = EvalTask::builder(input.clone(), Arc::new(LocalEvaluationService::new()))
        .metric("exact_match")
        .run_config(fast_config())
        .build()
        .unwrap();

    task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(task.dataset(), &input);
}

#[tokio::test]
async fn test_trajectory_metrics_from_runnable() {
    let agent = RunnableAdapter::from_fn("agent", |_input| {
        Ok(AgentResponse {
            response: Some("done".to_string()),
            predicted_trajectory: Some(json!([
                {"tool_name": "search", "tool_input": {"q": "rust"}}
            ])),
        })
    });
    let task = EvalTask::builder(
        dataset(json!([{
            "prompt": "find rust",
            "reference_trajectory": [{"tool_name": "search", "tool_input": {"q": "rust"}}]
        }])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metrics([
        "trajectory_exact_match",
        "trajectory_recall",
        "trajectory_single_tool_use:search",
    ])
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task
        .evaluate(EvaluateOptions::default().with_runnable(agent))
        .await
        .unwrap();

    assert_eq!(column(&result, "response"), vec![json!("done")]);
    assert_eq!(column(&result, "trajectory_exact_match/score"), vec![json!(1.0)]);
    assert_eq!(column(&result, "trajectory_recall/score"), vec![json!(1.0)]);
    assert_eq!(
        column(&result, "trajectory_single_tool_use/score"),
        vec![json!(1.0)]
    );
    assert_eq!(result.metadata["candidate_model_name"], "agent");
}

// ===== Judge Metric Tests =====

#[tokio::test]
async fn test_pointwise_fluency_judge() {
    let judge = ScriptedJudge::new(|request| {
        let (score, confidence) = match instance_field(request, "response").as_deref() {
            Some("test") => (5.0, 1.0),
            _ => (4.0, 0.5),
        };
        Ok(EvaluateInstancesResponse {
            results: EvaluationResults::Pointwise(PointwiseResult {
                score: Some(score),
                explanation: Some("e".to_string()),
                confidence: Some(confidence),
                custom_output: None,
            }),
        })
    });
    let task = EvalTask::builder(
        dataset(json!([{"response": "test"}, {"response": "text"}])),
        judge.clone(),
    )
    .metric("fluency")
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    let columns: BTreeSet<&str> = result
        .metrics_table
        .columns()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(
        columns,
        BTreeSet::from(["response", "fluency/score", "fluency/explanation"])
    );
    assert_eq!(column(&result, "fluency/score"), vec![json!(5.0), json!(4.0)]);
    assert_eq!(result.summary_f64("fluency/mean"), Some(4.5));
    assert_eq!(judge.calls(), 2);
}

#[tokio::test]
async fn test_pairwise_win_rates_with_bring_your_own_response() {
    let judge = ScriptedJudge::new(|request| {
        let choice = match instance_field(request, "response").as_deref() {
            Some("worse") => PairwiseChoice::Baseline,
            _ => PairwiseChoice::Candidate,
        };
        Ok(EvaluateInstancesResponse::pairwise(choice, "because"))
    });
    let rows: Vec<Value> = ["good", "good", "good", "worse"]
        .iter()
        .map(|r| json!({"prompt": "p", "response": r, "baseline_model_response": "base"}))
        .collect();
    let task = EvalTask::builder(dataset(Value::Array(rows)), judge)
        .metric("pairwise_safety")
        .run_config(fast_config())
        .build()
        .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(result.summary_f64("pairwise_safety/candidate_model_win_rate"), Some(0.75));
    assert_eq!(result.summary_f64("pairwise_safety/baseline_model_win_rate"), Some(0.25));
    assert_eq!(result.summary_f64("pairwise_safety/tie_rate"), Some(0.0));
    assert_eq!(
        column(&result, "pairwise_safety/pairwise_choice")[3],
        json!("BASELINE")
    );
}

#[tokio::test]
async fn test_judge_failure_is_recorded_per_row() {
    let judge = ScriptedJudge::new(|request| match instance_field(request, "response").as_deref() {
        Some("bad") => Err(JudgeError::invalid_argument("rejected")),
        _ => Ok(EvaluateInstancesResponse::pointwise(3.0, "fine")),
    });
    let task = EvalTask::builder(
        dataset(json!([{"response": "ok"}, {"response": "bad"}])),
        judge,
    )
    .metric("fluency")
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(column(&result, "fluency/score"), vec![json!(3.0), Value::Null]);
    assert_eq!(column(&result, "fluency/explanation")[1], json!(ERROR_EXPLANATION));
    assert_eq!(result.summary_f64("fluency/mean"), Some(3.0));
}

#[tokio::test]
async fn test_autorater_config_reaches_the_judge() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let judge = ScriptedJudge::new(move |request| {
        recorder.lock().unwrap().push(request.autorater_config.clone());
        Ok(EvaluateInstancesResponse::pointwise(1.0, "ok"))
    });
    let config = AutoraterConfig {
        sampling_count: Some(4),
        ..Default::default()
    };
    let task = EvalTask::builder(dataset(json!([{"response": "x"}])), judge)
        .metric("fluency")
        .autorater_config(config.clone())
        .run_config(fast_config())
        .build()
        .unwrap();

    task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(config)]);
}

// ===== Rubric Metric Tests =====

#[tokio::test]
async fn test_rubric_text_quality_generates_and_critiques() {
    let generator = ModelAdapter::from_fn("rubric-writer", |_prompt| {
        Ok("```json\n{\"questions\": [\"test_rubric\"]}\n```".to_string())
    });
    let judge = ScriptedJudge::new(|_request| {
        Ok(EvaluateInstancesResponse::raw_pointwise(vec![critique(&[
            ("test_rubric", "yes"),
            ("second_rubric", "no"),
        ])]))
    });
    let task = EvalTask::builder(
        dataset(json!([{"prompt": "write a poem", "response": "roses are red"}])),
        judge,
    )
    .metric("rb_text_quality")
    .rubric_generator(generator)
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(column(&result, "rubrics"), vec![json!(["test_rubric"])]);
    assert_eq!(column(&result, "rb_text_quality/score"), vec![json!(0.5)]);
    assert!(result.metrics_table.has_column("rb_text_quality/rubric_verdict_pairs"));
    assert!(result.metrics_table.has_column("rb_text_quality/raw_outputs"));
}

#[tokio::test]
async fn test_rubric_generation_needs_a_model() {
    let judge = ScriptedJudge::new(|_| Ok(EvaluateInstancesResponse::raw_pointwise(vec![])));
    let task = EvalTask::builder(
        dataset(json!([{"prompt": "p", "response": "r"}])),
        judge,
    )
    .metric("rb_instruction_following")
    .run_config(fast_config())
    .build()
    .unwrap();

    let err = task.evaluate(EvaluateOptions::default()).await.unwrap_err();
    assert!(matches!(err, EvalError::Configuration(_)));
}

#[tokio::test]
async fn test_existing_rubrics_skip_generation() {
    let generator_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&generator_calls);
    let generator = ModelAdapter::from_fn("rubric-writer", move |_prompt| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok("{\"questions\": []}".to_string())
    });
    let judge = ScriptedJudge::new(|request| {
        let rubrics = instance_field(request, "rubrics").unwrap_or_default();
        assert!(rubrics.contains("<question>is it short?</question>"));
        Ok(EvaluateInstancesResponse::raw_pointwise(vec![critique(&[(
            "is it short?",
            "yes",
        )])]))
    });
    let task = EvalTask::builder(
        dataset(json!([{"prompt": "p", "response": "r", "rubrics": ["is it short?"]}])),
        judge,
    )
    .metric("rb_instruction_following")
    .rubric_generator(generator)
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(generator_calls.load(Ordering::SeqCst), 0);
    assert_eq!(column(&result, "rb_instruction_following/score"), vec![json!(1.0)]);
}

#[tokio::test]
async fn test_pairwise_rubric_instruction_following() {
    let judge = ScriptedJudge::new(|_request| {
        Ok(EvaluateInstancesResponse::raw_pairwise(vec![format!(
            "[[Response A Answers:]]\n{}\n[[Response B Answers:]]\n{}\n[[SxS Rating: B > A]]",
            critique(&[("is it polite?", "no")]),
            critique(&[("is it polite?", "yes")])
        )]))
    });
    let task = EvalTask::builder(
        dataset(json!([{
            "prompt": "greet me",
            "response": "hello there",
            "baseline_model_response": "what",
            "rubrics": ["is it polite?"]
        }])),
        judge,
    )
    .metric("pairwise_rb_instruction_following")
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(
        column(&result, "pairwise_rb_instruction_following/pairwise_choice"),
        vec![json!("Candidate response is slightly better than the baseline response.")]
    );
    assert_eq!(
        column(&result, "pairwise_rb_instruction_following/score"),
        vec![json!(0.5)]
    );
    assert_eq!(
        result.summary_f64("pairwise_rb_instruction_following/candidate_model_win_rate"),
        Some(1.0)
    );
}

// ===== Inference Tests =====

#[tokio::test]
async fn test_prompt_template_drives_inference() {
    let model = ModelAdapter::from_fn("echo", |prompt| Ok(format!("echo: {}", prompt)));
    let task = EvalTask::builder(
        dataset(json!([
            {"name": "John", "reference": "echo: Hello, John!"},
            {"name": "Ada", "reference": "nope"}
        ])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task
        .evaluate(
            EvaluateOptions::default()
                .with_model(model)
                .with_prompt_template("Hello, {name}!"),
        )
        .await
        .unwrap();

    assert_eq!(
        column(&result, "prompt"),
        vec![json!("Hello, John!"), json!("Hello, Ada!")]
    );
    assert_eq!(column(&result, "exact_match/score"), vec![json!(1.0), json!(0.0)]);
    assert_eq!(column(&result, FAILURE_COLUMN), vec![json!(0), json!(0)]);
    assert!(result.summary_metrics.contains_key("latency_in_seconds/mean"));
    assert_eq!(result.summary_f64("failure/mean"), Some(0.0));
}

#[tokio::test]
async fn test_failed_inference_writes_sentinel_and_continues() {
    let model = ModelAdapter::from_fn("flaky", |prompt| {
        if prompt == "boom" {
            Err(EvalError::Inference("model exploded".to_string()))
        } else {
            Ok(prompt.to_string())
        }
    });
    let config = EvaluationRunConfig {
        max_inference_attempts: 1,
        ..fast_config()
    };
    let task = EvalTask::builder(
        dataset(json!([
            {"prompt": "fine", "reference": "fine"},
            {"prompt": "boom", "reference": "boom"}
        ])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .run_config(config)
    .build()
    .unwrap();

    let result = task
        .evaluate(EvaluateOptions::default().with_model(model))
        .await
        .unwrap();

    let responses = column(&result, RESPONSE_COLUMN);
    assert_eq!(responses[0], json!("fine"));
    assert!(responses[1]
        .as_str()
        .unwrap()
        .starts_with(INFERENCE_ERROR_PREFIX));
    assert_eq!(column(&result, FAILURE_COLUMN), vec![json!(0), json!(1)]);
    assert_eq!(column(&result, "exact_match/score"), vec![json!(1.0), json!(0.0)]);
}

#[tokio::test]
async fn test_baseline_model_runs_second_inference_pass() {
    let judge = ScriptedJudge::new(|request| {
        let baseline = instance_field(request, "baseline_model_response").unwrap_or_default();
        assert_eq!(baseline, "base: q");
        Ok(EvaluateInstancesResponse::pairwise(PairwiseChoice::Tie, "same"))
    });
    let baseline = ModelAdapter::from_fn("base-model", |prompt| Ok(format!("base: {}", prompt)));
    let metric = Metric::Pairwise(
        PairwiseMetric::new("my_pairwise", "{prompt} {response} {baseline_model_response}")
            .with_baseline_model(baseline),
    );
    let task = EvalTask::builder(dataset(json!([{"prompt": "q"}])), judge)
        .metric(metric)
        .run_config(fast_config())
        .build()
        .unwrap();

    let result = task
        .evaluate(
            EvaluateOptions::default()
                .with_model(ModelAdapter::from_fn("cand", |p| Ok(format!("cand: {}", p)))),
        )
        .await
        .unwrap();

    assert_eq!(column(&result, BASELINE_MODEL_RESPONSE_COLUMN), vec![json!("base: q")]);
    assert_eq!(result.summary_f64("my_pairwise/tie_rate"), Some(1.0));
    assert_eq!(result.metadata["baseline_model_name"], "base-model");
    assert_eq!(result.metadata["candidate_model_name"], "cand");
}

// ===== Validation Tests =====

#[tokio::test]
async fn test_response_column_and_model_conflict() {
    let task = EvalTask::builder(
        dataset(json!([{"prompt": "p", "response": "r", "reference": "r"}])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .build()
    .unwrap();

    let err = task
        .evaluate(EvaluateOptions::default().with_model(ModelAdapter::from_fn("m", |p| Ok(p.to_string()))))
        .await
        .unwrap_err();
    assert!(matches!(err, EvalError::Configuration(ref m) if m.contains("remove")));
}

#[tokio::test]
async fn test_missing_metric_columns_are_reported() {
    let task = EvalTask::builder(
        dataset(json!([{"response": "r"}])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .run_config(fast_config())
    .build()
    .unwrap();

    match task.evaluate(EvaluateOptions::default()).await {
        Err(EvalError::MissingColumns { metric, missing, available }) => {
            assert_eq!(metric, "exact_match");
            assert_eq!(missing, vec!["reference".to_string()]);
            assert_eq!(available, vec!["response".to_string()]);
        }
        other => panic!("expected missing columns, got {:?}", other.map(|r| r.metadata)),
    }
}

#[tokio::test]
async fn test_column_mapping_redirects_inputs() {
    let task = EvalTask::builder(
        dataset(json!([{"answer": "x", "gold": "x"}])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric("exact_match")
    .metric_column_mapping(BTreeMap::from([
        ("response".to_string(), "answer".to_string()),
        ("reference".to_string(), "gold".to_string()),
    ]))
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();
    assert_eq!(column(&result, "exact_match/score"), vec![json!(1.0)]);
}

#[tokio::test]
async fn test_pairwise_without_baseline_is_rejected() {
    let task = EvalTask::builder(
        dataset(json!([{"prompt": "p", "response": "r"}])),
        ScriptedJudge::new(|_| Err(JudgeError::invalid_argument("unused"))),
    )
    .metric("pairwise_fluency")
    .build()
    .unwrap();

    let err = task.evaluate(EvaluateOptions::default()).await.unwrap_err();
    assert!(matches!(err, EvalError::Configuration(ref m) if m.contains("baseline")));
}

#[test]
fn test_builder_rejects_bad_metric_lists() {
    let service: Arc<dyn EvaluationService> = Arc::new(LocalEvaluationService::new());
    let build = |metrics: Vec<MetricSpec>| {
        EvalTask::builder(Dataset::new(), Arc::clone(&service))
            .metrics(metrics)
            .build()
    };

    assert!(matches!(build(vec![]), Err(EvalError::Configuration(_))));
    assert!(matches!(
        build(vec!["not_a_metric".into()]),
        Err(EvalError::Configuration(_))
    ));
    assert!(matches!(
        build(vec!["bleu".into(), "bleu".into()]),
        Err(EvalError::Configuration(_))
    ));
    assert!(matches!(
        build(vec!["trajectory_single_tool_use".into()]),
        Err(EvalError::Configuration(ref m)) if m.contains("tool name")
    ));
    assert!(build(vec!["bleu".into(), "rouge_1".into()]).is_ok());
}

// ===== Custom Metric Tests =====

#[tokio::test]
async fn test_custom_metric_columns() {
    let metric = CustomMetric::new("length", |row: &Row| {
        let len = row
            .get("response")
            .and_then(Value::as_str)
            .map(str::len)
            .unwrap_or_default();
        let mut out = Row::new();
        out.insert("length".to_string(), json!(len as f64));
        out.insert("bucket".to_string(), json!(if len > 3 { "long" } else { "short" }));
        Ok(out)
    });
    let task = EvalTask::builder(
        dataset(json!([{"response": "abc"}, {"response": "abcdef"}])),
        Arc::new(LocalEvaluationService::new()),
    )
    .metric(Metric::Custom(metric))
    .run_config(fast_config())
    .build()
    .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    assert_eq!(column(&result, "length/score"), vec![json!(3.0), json!(6.0)]);
    assert_eq!(column(&result, "length/bucket"), vec![json!("short"), json!("long")]);
    assert_eq!(result.summary_f64("length/mean"), Some(4.5));
}

// ===== Progress and Ordering Tests =====

#[tokio::test]
async fn test_progress_and_row_order() {
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let progress: ProgressCallback = Arc::new(move |update: ProgressUpdate| {
        sink.lock().unwrap().push(update);
    });
    let rows: Vec<Value> = (0..25)
        .map(|i| json!({"response": format!("r{}", i), "reference": format!("r{}", i % 2 * i)}))
        .collect();
    let task = EvalTask::builder(dataset(Value::Array(rows)), Arc::new(LocalEvaluationService::new()))
        .metric("exact_match")
        .run_config(EvaluationRunConfig {
            max_workers: 4,
            ..fast_config()
        })
        .progress(progress)
        .build()
        .unwrap();

    let result = task.evaluate(EvaluateOptions::default()).await.unwrap();

    let expected: Vec<Value> = (0..25)
        .map(|i| json!(if i % 2 == 1 || i == 0 { 1.0 } else { 0.0 }))
        .collect();
    assert_eq!(column(&result, "exact_match/score"), expected);
    let updates = updates.lock().unwrap();
    let evaluation: Vec<&ProgressUpdate> = updates.iter().filter(|u| u.phase == "evaluation").collect();
    assert_eq!(evaluation.len(), 25);
    assert!(evaluation.iter().all(|u| u.total == 25));
    assert_eq!(evaluation.iter().map(|u| u.completed).max(), Some(25));
}

// ===== Single Row Tests =====

#[tokio::test]
async fn test_evaluate_row() {
    let task = EvalTask::builder(Dataset::new(), Arc::new(LocalEvaluationService::new()))
        .metric("exact_match")
        .run_config(fast_config())
        .build()
        .unwrap();

    let mut row = Row::new();
    row.insert("response".to_string(), json!("same"));
    row.insert("reference".to_string(), json!("same"));
    let result = task.evaluate_row(row, EvaluateOptions::default()).await.unwrap();

    assert_eq!(result.summary_metrics["row_count"], json!(1));
    assert_eq!(result.summary_f64("exact_match/mean"), Some(1.0));
    assert_eq!(result.summary_metrics["exact_match/std"], json!(NAN_SENTINEL));
}

// ===== Prompt Template Tests =====

#[test]
fn test_partial_template_assembly() {
    let template = PromptTemplate::new("Hello, {name}! Today is {day}.");
    let values = std::collections::HashMap::from([("name".to_string(), "John".to_string())]);
    let assembled = template.assemble(&values);
    assert_eq!(assembled.template, "Hello, John! Today is {day}.");
    assert_eq!(assembled.variables, BTreeSet::from(["day".to_string()]));
}
