//! End-to-end runs through the orchestrator with deterministic services.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use tabsplit_core::{
    ItemBreakdown, ItemizationBreakdown, Message, PersonSplit, PersonTotal, ReceiptExtraction,
    ReceiptItem,
};
use tabsplit_llm::mock::{EqualSplitReasoner, StaticReceiptExtractor, StaticSplitReasoner};
use tabsplit_llm::{ReceiptExtractor, SplitReasoner};
use tabsplit_runtime::stages::split_request::{NUM_PEOPLE_FIELD, PEOPLE_NAMES_FIELD};
use tabsplit_runtime::{
    CheckpointStore, InMemoryCheckpointStore, InputKind, Interrupt, Orchestrator, PipelineConfig,
    PipelineEvent, ReceiptPipeline, ResumeInput, RunPhase, RunStatus, RuntimeError,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn boot(
    extractor: impl ReceiptExtractor + 'static,
    reasoner: impl SplitReasoner + 'static,
) -> (Orchestrator, Arc<InMemoryCheckpointStore>) {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let pipeline = ReceiptPipeline::new(
        Arc::new(extractor),
        Arc::new(reasoner),
        PipelineConfig::default(),
    );
    let orch = Orchestrator::new(pipeline, Arc::clone(&store) as Arc<dyn CheckpointStore>, 8);
    (orch, store)
}

fn participants(count: serde_json::Value, names: &str) -> ResumeInput {
    ResumeInput::form([(NUM_PEOPLE_FIELD, count), (PEOPLE_NAMES_FIELD, json!(names))])
}

fn coffee_receipt() -> ReceiptExtraction {
    ReceiptExtraction {
        items: vec![ReceiptItem::new("Coffee", 5.0)],
        subtotal: 5.0,
        tax: 0.5,
        total: 5.5,
        analysis: "A single coffee".into(),
    }
}

fn alice_pays_coffee() -> ItemizationBreakdown {
    ItemizationBreakdown {
        item_breakdown: vec![ItemBreakdown {
            item_name: "Coffee".into(),
            item_price: 5.0,
            splits: vec![PersonSplit {
                person_name: "Alice".into(),
                amount: 5.0,
            }],
        }],
        person_totals: vec![PersonTotal {
            person_name: "Alice".into(),
            total: 5.0,
        }],
        total_before_tax: 5.0,
    }
}

fn pizza_receipt() -> ReceiptExtraction {
    ReceiptExtraction {
        items: vec![ReceiptItem::new("Pizza", 20.0), ReceiptItem::new("Soda", 4.0)],
        subtotal: 24.0,
        tax: 2.0,
        total: 26.0,
        analysis: "Pizza and soda".into(),
    }
}

#[tokio::test]
async fn single_person_pays_everything() {
    let (orch, _) = boot(
        StaticReceiptExtractor::new(coffee_receipt()),
        StaticSplitReasoner::new(alice_pays_coffee()),
    );

    let started = orch
        .start_run(vec![Message::user_image(b"\x89PNG", "image/png")])
        .await
        .unwrap();
    let RunStatus::AwaitingInput(Interrupt::Form(form)) = &started.status else {
        panic!("expected participants form, got {:?}", started.status);
    };
    assert_eq!(form.fields.len(), 2);

    let prompt = orch
        .resume_run(&started.run_id, participants(json!(1), "Alice"))
        .await
        .unwrap();
    let RunStatus::AwaitingInput(Interrupt::Prompt { text, .. }) = &prompt.status else {
        panic!("expected instructions prompt");
    };
    assert!(text.contains("1. Coffee: $5.00"));
    assert!(text.contains("People: Alice"));

    let done = orch
        .resume_run(&started.run_id, ResumeInput::text("Alice pays"))
        .await
        .unwrap();
    let RunStatus::Completed(itemization) = done.status else {
        panic!("expected completion");
    };
    assert!((itemization.person_totals["Alice"] - 5.5).abs() < 1e-9);
    assert!((itemization.total_tax - 0.5).abs() < 1e-9);
    assert!((itemization.item_breakdown[0].splits["Alice"] - 5.0).abs() < 1e-9);
}

#[tokio::test]
async fn equal_split_with_proportional_tax() {
    let (orch, store) = boot(StaticReceiptExtractor::new(pizza_receipt()), EqualSplitReasoner);

    let run = orch
        .start_run(vec![
            Message::user_text("here is our bill"),
            Message::user_image(b"jpeg", "image/jpeg"),
        ])
        .await
        .unwrap();
    let _ = orch
        .resume_run(&run.run_id, participants(json!("2"), "Alice, Bob"))
        .await
        .unwrap();
    let done = orch
        .resume_run(&run.run_id, ResumeInput::text("split everything equally"))
        .await
        .unwrap();

    let RunStatus::Completed(itemization) = done.status else {
        panic!("expected completion");
    };
    assert!((itemization.person_totals["Alice"] - 13.0).abs() < 1e-9);
    assert!((itemization.person_totals["Bob"] - 13.0).abs() < 1e-9);
    assert!((itemization.grand_total() - 26.0).abs() < 1e-9);

    let checkpoint = store.load(&run.run_id).await.unwrap().unwrap();
    assert_eq!(checkpoint.phase, RunPhase::Completed);
    assert_eq!(checkpoint.state.people_names.as_deref().unwrap(), ["Alice", "Bob"]);
    assert_eq!(
        checkpoint.state.split_instructions.as_deref(),
        Some("split everything equally")
    );
}

#[tokio::test]
async fn malformed_participants_keep_run_suspended() {
    let (orch, _) = boot(StaticReceiptExtractor::new(pizza_receipt()), EqualSplitReasoner);
    let run = orch
        .start_run(vec![Message::user_image(b"jpeg", "image/jpeg")])
        .await
        .unwrap();

    for bad in [
        participants(json!("abc"), "Alice"),
        participants(json!(0), "Alice"),
        participants(json!(2), " , "),
    ] {
        let outcome = orch.resume_run(&run.run_id, bad).await.unwrap();
        let RunStatus::AwaitingInput(interrupt) = outcome.status else {
            panic!("expected re-emitted form");
        };
        assert_eq!(interrupt.expects(), InputKind::Form);
        assert!(interrupt.error().is_some());
    }

    let outcome = orch
        .resume_run(&run.run_id, participants(json!(2), "Alice, Bob"))
        .await
        .unwrap();
    assert!(matches!(
        outcome.status,
        RunStatus::AwaitingInput(Interrupt::Prompt { error: None, .. })
    ));
}

#[tokio::test]
async fn wrong_input_kind_changes_nothing() {
    let (orch, store) = boot(StaticReceiptExtractor::new(pizza_receipt()), EqualSplitReasoner);
    let run = orch
        .start_run(vec![Message::user_image(b"jpeg", "image/jpeg")])
        .await
        .unwrap();
    let before = store.load(&run.run_id).await.unwrap().unwrap();

    let err = orch
        .resume_run(&run.run_id, ResumeInput::text("Alice and Bob"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::UnexpectedInput {
            expected: InputKind::Form,
            got: InputKind::Text
        }
    ));
    assert_eq!(store.load(&run.run_id).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn missing_image_fails_the_run() {
    let (orch, _) = boot(StaticReceiptExtractor::new(pizza_receipt()), EqualSplitReasoner);
    let run = orch
        .start_run(vec![Message::user_text("no picture, sorry")])
        .await
        .unwrap();
    let RunStatus::Failed(failure) = run.status else {
        panic!("expected failure");
    };
    assert_eq!(failure.category, "missing_image");
    assert!(!failure.recoverable);
}

#[tokio::test]
async fn events_trace_the_whole_run() {
    let (orch, _) = boot(StaticReceiptExtractor::new(coffee_receipt()), EqualSplitReasoner);
    let mut rx = orch.subscribe();

    let run = orch
        .start_run(vec![Message::user_image(b"png", "image/png")])
        .await
        .unwrap();
    let _ = orch
        .resume_run(&run.run_id, participants(json!(1), "Alice"))
        .await
        .unwrap();
    let _ = orch
        .resume_run(&run.run_id, ResumeInput::text("all mine"))
        .await
        .unwrap();

    let mut suspended = 0;
    let completed = timeout(TIMEOUT, async {
        loop {
            match rx.recv().await.unwrap() {
                PipelineEvent::RunSuspended { .. } => suspended += 1,
                PipelineEvent::RunCompleted { run_id, grand_total } => {
                    return (run_id, grand_total);
                }
                other => assert_eq!(other.run_id(), &run.run_id),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(suspended, 2);
    assert_eq!(completed.0, run.run_id);
    assert!((completed.1 - 5.5).abs() < 1e-9);
}
