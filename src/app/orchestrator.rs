//! Test suite orchestration: one submission graded against a batch of check specs.

use crate::app::errors::ServiceError;
use crate::app::verifier::QueryVerifier;
use crate::domain::check::{CheckSpec, Submission};
use crate::domain::sandbox::SandboxName;
use crate::domain::verify::{TestCaseResult, TestSuiteResult, VerificationOutcome};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

#[derive(Clone)]
pub struct TestSuiteRunner {
    verifier: QueryVerifier,
    parallel: bool,
}

impl TestSuiteRunner {
    pub fn new(verifier: QueryVerifier, parallel: bool) -> Self {
        Self { verifier, parallel }
    }

    /// Grades `submission` against every entry of `cases`, reporting results in input order.
    ///
    /// All check texts are parsed before any student SQL runs, so a malformed case
    /// rejects the whole request. After that, every case gets a result: per-case
    /// failures are attached to the case and never abort the rest. Only losing the
    /// connection to the sandbox is propagated.
    #[tracing::instrument(
        skip(self, submission, cases),
        fields(sandbox = %sandbox, command = %submission.command, cases = cases.len())
    )]
    pub async fn run(
        &self,
        sandbox: &SandboxName,
        submission: &Submission,
        cases: Vec<String>,
    ) -> Result<TestSuiteResult, ServiceError> {
        let specs = cases
            .iter()
            .map(|text| CheckSpec::parse(submission.command, text))
            .collect::<Result<Vec<_>, _>>()?;

        let results = if self.parallel && specs.len() > 1 {
            self.run_concurrently(sandbox, submission, cases, specs).await?
        } else {
            self.run_sequentially(sandbox, submission, cases, specs).await?
        };

        let suite = TestSuiteResult::from_cases(sandbox.logical(), results);
        tracing::info!(num = suite.num, num_ok = suite.num_ok, ok = suite.ok, "test suite graded");
        Ok(suite)
    }

    async fn run_sequentially(
        &self,
        sandbox: &SandboxName,
        submission: &Submission,
        cases: Vec<String>,
        specs: Vec<CheckSpec>,
    ) -> Result<Vec<TestCaseResult>, ServiceError> {
        let mut results = Vec::with_capacity(specs.len());
        for (data_in, spec) in cases.into_iter().zip(specs) {
            let started = Instant::now();
            let outcome = self.verifier.verify(sandbox, &submission.code, &spec).await?;
            results.push(TestCaseResult::new(data_in, outcome, elapsed_ms(started)));
        }
        Ok(results)
    }

    /// Each case runs in its own rolled-back transaction on its own connection, so
    /// cases cannot observe each other and the order of completion does not matter.
    async fn run_concurrently(
        &self,
        sandbox: &SandboxName,
        submission: &Submission,
        cases: Vec<String>,
        specs: Vec<CheckSpec>,
    ) -> Result<Vec<TestCaseResult>, ServiceError> {
        let code: Arc<str> = Arc::from(submission.code.as_str());
        let mut set = JoinSet::new();
        for (index, spec) in specs.into_iter().enumerate() {
            let verifier = self.verifier.clone();
            let sandbox = sandbox.clone();
            let code = Arc::clone(&code);
            set.spawn(async move {
                let started = Instant::now();
                let outcome = verifier.verify(&sandbox, &code, &spec).await;
                (index, outcome, elapsed_ms(started))
            });
        }

        let mut slots: Vec<Option<(VerificationOutcome, u64)>> = vec![None; cases.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome, elapsed)) => slots[index] = Some((outcome?, elapsed)),
                Err(e) => tracing::error!(error = %e, "test case task aborted"),
            }
        }

        Ok(cases
            .into_iter()
            .zip(slots)
            .map(|(data_in, slot)| match slot {
                Some((outcome, elapsed)) => TestCaseResult::new(data_in, outcome, elapsed),
                None => TestCaseResult::new(
                    data_in,
                    VerificationOutcome::errored("test case was aborted before it finished"),
                    0,
                ),
            })
            .collect())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
