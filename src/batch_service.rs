use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::grading_service::GradingService;
use crate::models::{BatchResult, GradeOutcome, Question};
use crate::webhook_service::DeliveryService;

/// Shown to the student when a grading task failed in a way the retry
/// supervisor did not convert itself.
const UNHANDLED_FAILURE_FEEDBACK: &str = "Tekninen virhe arvioinnissa.";

/// Fans a batch of questions out to a bounded pool of concurrent grading
/// tasks, collects every outcome, restores canonical order and computes
/// aggregate metadata. Per-question failures are data, not faults: they
/// never fail the batch.
#[derive(Clone)]
pub struct BatchService {
    grading: GradingService,
    delivery: DeliveryService,
    max_parallel_tasks: usize,
}

impl BatchService {
    pub fn new(
        grading: GradingService,
        delivery: DeliveryService,
        max_parallel_tasks: usize,
    ) -> Self {
        Self {
            grading,
            delivery,
            max_parallel_tasks,
        }
    }

    /// Grade all questions concurrently and assemble the batch result.
    ///
    /// The only failure this surfaces is an empty batch, detected before
    /// any task is launched.
    pub async fn process(&self, questions: &[Question]) -> Result<BatchResult> {
        if questions.is_empty() {
            bail!("no questions provided");
        }

        let started = Instant::now();
        info!(
            question_count = questions.len(),
            max_parallel_tasks = self.max_parallel_tasks,
            "Starting batch grading"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_tasks));
        let mut handles = Vec::with_capacity(questions.len());

        for question in questions {
            let grading = self.grading.clone();
            let semaphore = Arc::clone(&semaphore);
            let question = question.clone();
            handles.push(tokio::spawn(async move {
                // The permit is held for the full retry loop of one
                // question and released on drop whatever the result.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("admission gate closed");
                grading.grade_with_retry(&question).await
            }));
        }

        let joined = join_all(handles).await;

        let mut outcomes = Vec::with_capacity(questions.len());
        for (question, joined_result) in questions.iter().zip(joined) {
            match joined_result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // grade_with_retry always returns a value, so this only
                    // fires if the task itself panicked or was aborted.
                    error!(
                        order = question.order,
                        error = %e,
                        "Grading task terminated abnormally"
                    );
                    outcomes.push(GradeOutcome::failure(
                        question.order,
                        question.points_possible,
                        UNHANDLED_FAILURE_FEEDBACK.to_string(),
                        e.to_string(),
                    ));
                }
            }
        }

        outcomes.sort_by_key(|o| o.order);

        // Contiguity check: sorted orders should be exactly 0..N-1. A gap
        // indicates an upstream correlation bug; re-assert the identity
        // invariant and carry on.
        let contiguous = outcomes.iter().enumerate().all(|(idx, o)| o.order == idx);
        if !contiguous {
            warn!(
                orders = ?outcomes.iter().map(|o| o.order).collect::<Vec<_>>(),
                expected_count = outcomes.len(),
                "Outcome orders are not the contiguous range 0..N-1, re-deriving question ids"
            );
            for outcome in &mut outcomes {
                outcome.question_id = outcome.order;
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        let processing_time_seconds = (elapsed * 100.0).round() / 100.0;

        let result = BatchResult::new(outcomes, processing_time_seconds);
        info!(
            total_questions = result.metadata.total_questions,
            successful = result.metadata.successful,
            failed = result.metadata.failed,
            processing_time_seconds = result.metadata.processing_time_seconds,
            "Batch grading completed"
        );

        Ok(result)
    }

    /// Grade the batch, then attempt callback delivery and record the
    /// result into `webhook_sent`.
    pub async fn process_and_deliver(
        &self,
        questions: &[Question],
        callback_url: &str,
    ) -> Result<BatchResult> {
        let mut result = self.process(questions).await?;

        let sent = self.delivery.deliver(&result, callback_url).await;
        if !sent {
            warn!(
                callback_url,
                question_count = result.metadata.total_questions,
                "Batch result could not be delivered to callback"
            );
        }
        result.webhook_sent = sent;

        Ok(result)
    }
}
