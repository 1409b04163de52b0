//! Grading and inspection against a live Postgres.
//!
//! Every test works on its own sandbox loaded from the `students` fixture:
//!
//! | id | name | grade | nickname |
//! |----|------|-------|----------|
//! | 1  | Ann  | 5     | annie    |
//! | 2  | Bob  | 4     | NULL     |
//! | 3  | Cid  | 3     | NULL     |
//! | 4  | Dee  | 2     | dee      |

mod common;

use common::{fixture, fixture_with, students_sandbox, test_config};
use sql_sandbox_grader::domain::inspect::DebugOutput;
use sql_sandbox_grader::domain::verify::CaseStatus;
use sql_sandbox_grader::infra::config::{Credentials, SelectCheckMode};
use sql_sandbox_grader::infra::provisioner::{ConnectionProvisioner, Mode, Role};
use sql_sandbox_grader::{CommandType, DebugFormat, SandboxService, ServiceError};
use sqlx::Executor;

fn cases(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

async fn grades(service: &SandboxService, name: &str) -> DebugOutput {
    service
        .debug(name, "SELECT id, grade FROM students ORDER BY id", DebugFormat::Array)
        .await
        .result
        .expect("grades query")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn select_passes_when_student_rows_are_a_subset() {
    let Some(fx) = fixture_with(|c| c.select_check = SelectCheckMode::Subset) else { return };
    let name = "it_grading_select";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "SELECT name FROM students WHERE grade >= 4;",
            CommandType::Select,
            cases(&[
                "SELECT name FROM students WHERE grade > 3",
                // The reference has more rows; a subset still passes.
                "SELECT name FROM students",
                "SELECT name FROM students WHERE grade = 5",
                "SELECT id, name FROM students",
            ]),
        )
        .await
        .expect("testing");

    assert_eq!(suite.name, name);
    assert_eq!(suite.num, 4);
    assert_eq!(suite.num_ok, 2);
    assert!(!suite.ok);
    let oks: Vec<bool> = suite.tests.iter().map(|t| t.ok).collect();
    assert_eq!(oks, vec![true, true, false, false]);
    assert_eq!(suite.tests[2].status, CaseStatus::Failed);

    let mismatch = &suite.tests[3];
    assert_eq!(mismatch.status, CaseStatus::Errored);
    let error = mismatch.error.as_deref().unwrap();
    assert!(
        error.starts_with("Student and reference queries cannot be compared"),
        "{error}"
    );
    assert!(error.contains("EXCEPT"), "{error}");

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn symmetric_select_also_requires_every_reference_row() {
    let Some(fx) = fixture_with(|c| c.select_check = SelectCheckMode::Symmetric) else { return };
    let name = "it_grading_symmetric";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "SELECT name FROM students WHERE grade >= 4",
            CommandType::Select,
            cases(&[
                "SELECT name FROM students WHERE grade IN (4, 5)",
                "SELECT name FROM students",
            ]),
        )
        .await
        .unwrap();
    let oks: Vec<bool> = suite.tests.iter().map(|t| t.ok).collect();
    assert_eq!(oks, vec![true, false]);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_is_checked_by_row_count_and_rolled_back() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_update";
    students_sandbox(&fx, name).await;
    let before = grades(&fx.service, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = grade + 1 WHERE grade < 3",
            CommandType::Update,
            cases(&[
                "1\nSELECT * FROM students WHERE name = 'Dee' AND grade = 3",
                "0\r\nSELECT * FROM students WHERE grade < 3",
                "2\nSELECT * FROM students WHERE grade = 3",
                "1\nSELECT * FROM students WHERE grade = 2",
            ]),
        )
        .await
        .unwrap();

    let oks: Vec<bool> = suite.tests.iter().map(|t| t.ok).collect();
    assert_eq!(oks, vec![true, true, true, false]);
    assert_eq!(
        suite.tests[3].error.as_deref(),
        Some("expected 1 row(s), found 0")
    );
    // Every case saw the original data, and none of them persisted.
    assert_eq!(grades(&fx.service, name).await, before);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn insert_cases_are_isolated_from_each_other() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_insert";
    students_sandbox(&fx, name).await;

    // The same primary key is inserted once per case; a leaked insert would break case two.
    let suite = fx
        .service
        .testing(
            name,
            "INSERT INTO students (id, name, grade) VALUES (5, 'Eve', 4)",
            CommandType::Insert,
            cases(&[
                "3\nSELECT * FROM students WHERE grade >= 4",
                "5\nSELECT * FROM students",
            ]),
        )
        .await
        .unwrap();
    assert!(suite.ok, "{:?}", suite.tests);
    assert_eq!(suite.num_ok, 2);

    let count = fx
        .service
        .debug(name, "SELECT count(*) FROM students", DebugFormat::Array)
        .await;
    assert_eq!(
        count.result,
        Some(DebugOutput::Array(vec![vec![Some("4".to_string())]]))
    );

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_passes_when_the_check_finds_nothing() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_delete";
    students_sandbox(&fx, name).await;
    let before = grades(&fx.service, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "DELETE FROM students WHERE grade < 3",
            CommandType::Delete,
            cases(&[
                "SELECT * FROM students WHERE grade < 3",
                "SELECT * FROM students WHERE grade < 4",
            ]),
        )
        .await
        .unwrap();
    let oks: Vec<bool> = suite.tests.iter().map(|t| t.ok).collect();
    assert_eq!(oks, vec![true, false]);
    assert_eq!(grades(&fx.service, name).await, before);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_row_count_rejects_the_whole_request() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_invalid";
    students_sandbox(&fx, name).await;
    let before = grades(&fx.service, name).await;

    let err = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = 0",
            CommandType::Update,
            cases(&["0\nSELECT * FROM students WHERE grade = 0", "all\nSELECT 1"]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCheckCommand { .. }), "{err:?}");
    assert_eq!(grades(&fx.service, name).await, before);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn student_errors_are_attached_to_their_case() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_errors";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "SELEC name FROM students",
            CommandType::Select,
            cases(&["SELECT name FROM students", "SELECT name FROM students"]),
        )
        .await
        .unwrap();
    assert_eq!(suite.num, 2);
    assert_eq!(suite.num_ok, 0);
    for case in &suite.tests {
        assert_eq!(case.status, CaseStatus::Errored);
        assert!(case.error.as_deref().unwrap().contains("syntax error"));
    }

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn a_trailing_commit_cannot_persist_a_submission() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_commit";
    students_sandbox(&fx, name).await;
    let before = grades(&fx.service, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = 0; COMMIT",
            CommandType::Update,
            cases(&["4\nSELECT * FROM students WHERE grade = 0"]),
        )
        .await
        .unwrap();
    assert!(!suite.ok);
    assert_eq!(suite.tests[0].status, CaseStatus::Errored);
    assert_eq!(grades(&fx.service, name).await, before);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_submissions_time_out() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_timeout";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "SELECT 1 AS one FROM pg_sleep(10)",
            CommandType::Select,
            cases(&["SELECT 1"]),
        )
        .await
        .unwrap();
    assert!(!suite.ok);
    assert_eq!(suite.tests[0].status, CaseStatus::Errored);
    let error = suite.tests[0].error.as_deref().unwrap();
    assert!(error.contains("timed out"), "{error}");

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_cases_keep_input_order() {
    let Some(fx) = fixture_with(|c| c.parallel_cases = true) else { return };
    let name = "it_grading_parallel";
    students_sandbox(&fx, name).await;

    let texts: Vec<String> = (0..6)
        .map(|i| {
            let expected = if i % 2 == 0 { 4 } else { 3 };
            format!("{}\nSELECT * FROM students WHERE grade = 0", expected)
        })
        .collect();
    let suite = fx
        .service
        .testing(name, "UPDATE students SET grade = 0", CommandType::Update, texts.clone())
        .await
        .unwrap();

    let data_in: Vec<&str> = suite.tests.iter().map(|t| t.data_in.as_str()).collect();
    assert_eq!(data_in, texts.iter().map(String::as_str).collect::<Vec<_>>());
    let oks: Vec<bool> = suite.tests.iter().map(|t| t.ok).collect();
    assert_eq!(oks, vec![true, false, true, false, true, false]);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debug_renders_tables_and_rolls_back() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_debug";
    students_sandbox(&fx, name).await;

    let table = fx
        .service
        .debug(
            name,
            "SELECT id, nickname FROM students WHERE id IN (1, 2) ORDER BY id",
            DebugFormat::Tabular,
        )
        .await;
    assert_eq!(table.error, None);
    assert_eq!(table.columns, vec!["id".to_string(), "nickname".to_string()]);
    let text = match &table.result {
        Some(DebugOutput::Tabular(text)) => text.clone(),
        other => panic!("expected tabular output, got {other:?}"),
    };
    assert!(text.contains("annie"), "{text}");
    assert!(text.ends_with("(2 rows)"), "{text}");

    let array = fx
        .service
        .debug(
            name,
            "SELECT nickname, grade > 3 AS good FROM students WHERE id = 2",
            DebugFormat::Array,
        )
        .await;
    assert_eq!(
        array.result,
        Some(DebugOutput::Array(vec![vec![None, Some("t".to_string())]]))
    );

    let update = fx
        .service
        .debug(name, "DELETE FROM students", DebugFormat::Tabular)
        .await;
    assert_eq!(update.rows_affected, Some(4));
    assert_eq!(
        update.result,
        Some(DebugOutput::Tabular("(4 rows affected)".to_string()))
    );

    let broken = fx
        .service
        .debug(name, "SELECT missing FROM students", DebugFormat::Tabular)
        .await;
    assert!(broken.result.is_none());
    assert!(broken.error.unwrap().contains("missing"));

    let count = fx
        .service
        .debug(name, "SELECT count(*) AS n FROM students", DebugFormat::Array)
        .await;
    assert_eq!(
        count.result,
        Some(DebugOutput::Array(vec![vec![Some("4".to_string())]]))
    );

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trailing_line_comments_do_not_break_the_check() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_comments";
    students_sandbox(&fx, name).await;

    let select = fx
        .service
        .testing(
            name,
            "SELECT name FROM students -- my answer",
            CommandType::Select,
            cases(&[
                "SELECT name FROM students",
                "SELECT name FROM students -- reference",
            ]),
        )
        .await
        .unwrap();
    assert!(select.ok, "{:?}", select.tests);

    let delete = fx
        .service
        .testing(
            name,
            "DELETE FROM students WHERE grade < 3; -- note",
            CommandType::Delete,
            cases(&["SELECT * FROM students WHERE grade < 3 -- leftovers"]),
        )
        .await
        .unwrap();
    assert!(delete.ok, "{:?}", delete.tests);

    let update = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = 0 WHERE id = 4; -- only Dee",
            CommandType::Update,
            cases(&["1\nSELECT * FROM students WHERE grade = 0 -- Dee"]),
        )
        .await
        .unwrap();
    assert!(update.ok, "{:?}", update.tests);

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn debug_keeps_char_padding_and_numeric_scale() {
    let Some(fx) = fixture() else { return };
    let name = "it_grading_debug_types";
    students_sandbox(&fx, name).await;

    let values = fx
        .service
        .debug(
            name,
            "SELECT 'ab'::char(4) AS c, 12.50::numeric(10,2) AS n, 0.0000001::numeric AS m, \
             'NaN'::numeric AS x",
            DebugFormat::Array,
        )
        .await;
    assert_eq!(values.error, None);
    let expected = ["ab  ", "12.50", "0.0000001", "NaN"]
        .iter()
        .map(|v| Some(v.to_string()))
        .collect();
    assert_eq!(values.result, Some(DebugOutput::Array(vec![expected])));

    fx.service.delete(name).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn each_statement_gets_its_own_client_deadline() {
    // Both statements stay under the 3 s server timeout, but together they outlast the
    // 5 s client deadline (statement timeout plus grace).
    let Some(fx) = fixture() else { return };
    let name = "it_grading_two_slow_statements";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = grade + 1 WHERE id = (SELECT 1 FROM pg_sleep(2.7))",
            CommandType::Update,
            cases(&[
                "1\nSELECT students.* FROM students, pg_sleep(2.7) WHERE id = 1 AND grade = 6",
            ]),
        )
        .await
        .unwrap();
    assert!(suite.ok, "{:?}", suite.tests);
    assert_eq!(suite.tests[0].status, CaseStatus::Passed);

    fx.service.delete(name).await.unwrap();
}

const RUNNER_ROLE: &str = "it_grading_runner";
const RUNNER_PASSWORD: &str = "it_grading_runner_pw";

/// Creates the least-privilege login, or returns `false` when the admin may not.
async fn ensure_runner_role(admin: &ConnectionProvisioner) -> bool {
    let mut session = match admin.acquire(Role::Admin, None, Mode::Autocommit).await {
        Ok(session) => session,
        Err(e) => {
            println!("cannot reach the admin database ({e}); skipping runner role test");
            return false;
        }
    };
    let create = format!(
        "DO $$ BEGIN \
           IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = '{RUNNER_ROLE}') THEN \
             CREATE ROLE {RUNNER_ROLE} LOGIN; \
           END IF; \
         END $$; \
         ALTER ROLE {RUNNER_ROLE} LOGIN NOSUPERUSER PASSWORD '{RUNNER_PASSWORD}'"
    );
    let created = session.conn().execute(create.as_str()).await;
    let _ = session.release().await;
    match created {
        Ok(_) => true,
        Err(e) => {
            println!("admin cannot create roles ({e}); skipping runner role test");
            false
        }
    }
}

async fn drop_runner_role(admin: &ConnectionProvisioner) {
    if let Ok(mut session) = admin.acquire(Role::Admin, None, Mode::Autocommit).await {
        let drop = format!("DROP ROLE IF EXISTS {RUNNER_ROLE}");
        let _ = session.conn().execute(drop.as_str()).await;
        let _ = session.release().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_role_grades_but_cannot_drop_tables() {
    let Some(config) = test_config() else { return };
    let admin = ConnectionProvisioner::new(&config);
    if !ensure_runner_role(&admin).await {
        return;
    }
    let Some(fx) = fixture_with(|c| {
        c.runner = Credentials {
            user: RUNNER_ROLE.to_string(),
            password: RUNNER_PASSWORD.to_string(),
        }
    }) else {
        return;
    };
    let name = "it_grading_runner";
    students_sandbox(&fx, name).await;

    let suite = fx
        .service
        .testing(
            name,
            "UPDATE students SET grade = grade + 1 WHERE grade < 3",
            CommandType::Update,
            cases(&["1\nSELECT * FROM students WHERE name = 'Dee' AND grade = 3"]),
        )
        .await
        .unwrap();
    assert!(suite.ok, "{:?}", suite.tests);

    let dropped = fx
        .service
        .debug(name, "DROP TABLE students", DebugFormat::Tabular)
        .await;
    let error = dropped.error.unwrap_or_default();
    assert!(error.contains("must be owner"), "{error}");

    let who = fx
        .service
        .debug(name, "SELECT current_user", DebugFormat::Array)
        .await;
    assert_eq!(
        who.result,
        Some(DebugOutput::Array(vec![vec![Some(RUNNER_ROLE.to_string())]]))
    );

    fx.service.delete(name).await.unwrap();
    drop_runner_role(&admin).await;
}
