//! Definition-of-Done gates for one week package.
//!
//! Every gate degrades to appending a human-readable Problem string and
//! continuing, so one run surfaces every defect at once. A gate whose
//! target file is absent stays silent; the structural gate owns the
//! missing-file Problem.
//!
//! # Gate categories
//!
//! - Structural presence (required files/dirs, populated examples/ and tests/)
//! - Chapter content (DoD keyword, TODO placeholder ratio)
//! - Template drift (release only: unmodified starter solution)
//! - Cross-references (terms vs. glossary, anchors vs. test files; see `xref`)
//! - QA blocking items (idle/release only)
//! - Test run (task/release only: pytest over the week's tests/)

use crate::core::output;
use crate::core::xref;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Verification context selecting which gates run and how strict the
/// placeholder threshold is.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Task,
    Idle,
    Release,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Task => "task",
            Mode::Idle => "idle",
            Mode::Release => "release",
        }
    }
}

/// Immutable per-run inputs shared by every gate.
#[derive(Debug)]
pub struct GateCtx {
    pub root: PathBuf,
    pub week: String,
    pub week_dir: PathBuf,
    pub mode: Mode,
    pub verbose: bool,
    /// Interpreter used to launch pytest.
    pub python: String,
    /// Bounded wait for the test run; `None` preserves the unbounded wait.
    pub test_timeout: Option<u64>,
}

impl GateCtx {
    fn vlog(&self, message: &str) {
        if self.verbose {
            eprintln!("gate: {}", message);
        }
    }

    fn rel<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }
}

/// Run every gate selected by the context and return the accumulated
/// Problem list. Order and coverage follow the reporting contract:
/// structural, chapter content, template drift, terms, anchors, QA
/// blocking, test run.
pub fn run_gate(ctx: &GateCtx) -> Vec<String> {
    let mut problems = Vec::new();

    if !ctx.week_dir.is_dir() {
        problems.push(format!("missing week dir: chapters/{}/", ctx.week));
        return problems;
    }
    ctx.vlog(&format!(
        "validating {} (mode={})",
        ctx.week,
        ctx.mode.as_str()
    ));

    check_required_paths(ctx, &mut problems);
    check_chapter_dod(ctx, &mut problems);
    check_chapter_content(ctx, &mut problems);
    check_examples_exist(ctx, &mut problems);

    if ctx.mode == Mode::Release {
        check_solution_customized(ctx, &mut problems);
    }

    xref::check_terms(ctx, &mut problems);
    xref::check_anchors(ctx, &mut problems);

    if matches!(ctx.mode, Mode::Idle | Mode::Release) {
        let qa_path = ctx.week_dir.join("QA_REPORT.md");
        if qa_path.is_file() {
            check_qa_blocking(ctx, &qa_path, &mut problems);
        }
    }

    if matches!(ctx.mode, Mode::Task | Mode::Release) {
        run_week_tests(ctx, &mut problems);
    }

    if !problems.is_empty() {
        ctx.vlog(&format!(
            "problems {}: {}",
            problems.len(),
            output::preview_problems(&problems, 2, 110)
        ));
    }
    problems
}

fn check_required_paths(ctx: &GateCtx, problems: &mut Vec<String>) {
    let required_files = [
        ctx.week_dir.join("CHAPTER.md"),
        ctx.week_dir.join("ASSIGNMENT.md"),
        ctx.week_dir.join("RUBRIC.md"),
        ctx.week_dir.join("QA_REPORT.md"),
        ctx.week_dir.join("ANCHORS.yml"),
        ctx.week_dir.join("TERMS.yml"),
        ctx.week_dir.join("starter_code").join("solution.py"),
    ];
    let required_dirs = [
        ctx.week_dir.join("examples"),
        ctx.week_dir.join("tests"),
        ctx.week_dir.join("starter_code"),
    ];

    for path in &required_files {
        if path.is_file() {
            ctx.vlog(&format!("OK file: {}", ctx.rel(path)));
        } else {
            problems.push(format!("missing required file: {}", ctx.rel(path)));
        }
    }
    for path in &required_dirs {
        if path.is_dir() {
            ctx.vlog(&format!("OK dir: {}", ctx.rel(path)));
        } else {
            problems.push(format!("missing required dir: {}", ctx.rel(path)));
        }
    }

    let tests_dir = ctx.week_dir.join("tests");
    if tests_dir.is_dir() && !dir_has_file(&tests_dir, |name| {
        name.starts_with("test_") && name.ends_with(".py")
    }) {
        problems.push(format!(
            "tests dir has no test_*.py files: {}",
            ctx.rel(&tests_dir)
        ));
    }
}

fn dir_has_file(dir: &Path, matches: impl Fn(&str) -> bool) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.path().is_file() && matches(&entry.file_name().to_string_lossy())
    })
}

fn check_examples_exist(ctx: &GateCtx, problems: &mut Vec<String>) {
    let examples_dir = ctx.week_dir.join("examples");
    if !examples_dir.is_dir() {
        // already caught by check_required_paths
        return;
    }
    let count = fs::read_dir(&examples_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    e.path().is_file()
                        && e.path().extension().is_some_and(|ext| ext == "py")
                })
                .count()
        })
        .unwrap_or(0);
    if count == 0 {
        problems.push(format!(
            "examples/ has no .py files: {}",
            ctx.rel(&examples_dir)
        ));
    } else {
        ctx.vlog(&format!("examples/ has {} .py file(s)", count));
    }
}

fn check_chapter_dod(ctx: &GateCtx, problems: &mut Vec<String>) {
    let chapter_path = ctx.week_dir.join("CHAPTER.md");
    let Ok(text) = fs::read_to_string(&chapter_path) else {
        return;
    };
    let spellings = ["DoD", "Definition of Done", "本周 DoD"];
    if !spellings.iter().any(|needle| text.contains(needle)) {
        problems.push("CHAPTER.md missing DoD section/mention".to_string());
    }
}

fn check_chapter_content(ctx: &GateCtx, problems: &mut Vec<String>) {
    let chapter_path = ctx.week_dir.join("CHAPTER.md");
    let Ok(text) = fs::read_to_string(&chapter_path) else {
        return;
    };
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        problems.push("CHAPTER.md is empty".to_string());
        return;
    }

    let todo_lines = lines
        .iter()
        .filter(|l| l.contains("TODO") || l.contains("（TODO）"))
        .count();
    let ratio = todo_lines as f64 / lines.len() as f64;
    ctx.vlog(&format!(
        "CHAPTER.md: {} non-empty lines, {} TODO lines ({:.0}%)",
        lines.len(),
        todo_lines,
        ratio * 100.0
    ));

    if ctx.mode == Mode::Release && ratio > 0.20 {
        problems.push(format!(
            "CHAPTER.md still has {:.0}% TODO lines (release requires <=20%)",
            ratio * 100.0
        ));
    } else if ratio > 0.50 {
        problems.push(format!(
            "CHAPTER.md has {:.0}% TODO lines (>50%, still a skeleton)",
            ratio * 100.0
        ));
    }
}

fn check_solution_customized(ctx: &GateCtx, problems: &mut Vec<String>) {
    let solution_path = ctx.week_dir.join("starter_code").join("solution.py");
    let Ok(text) = fs::read_to_string(&solution_path) else {
        return;
    };
    // The unmodified scaffold carries this marker pair verbatim.
    if text.contains("# Default: identity transform") && text.contains("return text") {
        problems.push(
            "starter_code/solution.py is still the default template (not customised for this week)"
                .to_string(),
        );
    }
}

#[derive(Clone, Copy, PartialEq)]
enum CommentState {
    Outside,
    Inside,
}

fn check_qa_blocking(ctx: &GateCtx, qa_path: &Path, problems: &mut Vec<String>) {
    let Ok(text) = fs::read_to_string(qa_path) else {
        return;
    };
    let lines: Vec<&str> = text.lines().collect();

    let Some(heading_idx) = lines
        .iter()
        .position(|l| l.trim().starts_with("## 阻塞项"))
    else {
        problems.push("QA_REPORT.md missing '## 阻塞项' section".to_string());
        return;
    };

    let start = heading_idx + 1;
    let end = lines[start..]
        .iter()
        .position(|l| l.trim().starts_with("## "))
        .map(|offset| start + offset)
        .unwrap_or(lines.len());

    let mut state = CommentState::Outside;
    for line in &lines[start..end] {
        let stripped = line.trim();
        match state {
            CommentState::Outside => {
                if stripped.contains("<!--") {
                    if !stripped.contains("-->") {
                        state = CommentState::Inside;
                    }
                    continue;
                }
                if line.contains("- [ ]") {
                    problems.push(
                        "QA blocking item not resolved (found unchecked '- [ ]' under '## 阻塞项')"
                            .to_string(),
                    );
                    break;
                }
            }
            CommentState::Inside => {
                if stripped.contains("-->") {
                    state = CommentState::Outside;
                }
            }
        }
    }
    ctx.vlog("QA blocking section scanned");
}

enum TestOutcome {
    Completed(Output),
    TimedOut,
}

fn run_with_timeout(cmd: &mut Command, limit: Duration) -> std::io::Result<TestOutcome> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(TestOutcome::Completed(child.wait_with_output()?));
        }
        if started.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(TestOutcome::TimedOut);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn run_week_tests(ctx: &GateCtx, problems: &mut Vec<String>) {
    let tests_dir = ctx.root.join("chapters").join(&ctx.week).join("tests");
    let mut cmd = Command::new(&ctx.python);
    cmd.args(["-m", "pytest"])
        .arg(&tests_dir)
        .arg("-q")
        .current_dir(&ctx.root);
    ctx.vlog(&format!(
        "running: {} -m pytest {} -q",
        ctx.python,
        tests_dir.display()
    ));

    let outcome = match ctx.test_timeout {
        None => cmd.output().map(TestOutcome::Completed),
        Some(secs) => run_with_timeout(&mut cmd, Duration::from_secs(secs)),
    };

    match outcome {
        Ok(TestOutcome::Completed(out)) => {
            if out.status.success() {
                ctx.vlog("pytest passed");
                return;
            }
            problems.push("pytest failed".to_string());
            let stdout = String::from_utf8_lossy(&out.stdout);
            if !stdout.trim().is_empty() {
                problems.push(format!("pytest stdout:\n{}", stdout.trim_end()));
            }
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.trim().is_empty() {
                problems.push(format!("pytest stderr:\n{}", stderr.trim_end()));
            }
        }
        Ok(TestOutcome::TimedOut) => {
            problems.push(format!(
                "pytest timed out after {}s",
                ctx.test_timeout.unwrap_or_default()
            ));
        }
        Err(e) => {
            problems.push(format!("failed to run pytest: {}", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn ctx_for(mode: Mode) -> (TempDir, GateCtx) {
        let tmp = tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let week_dir = root.join("chapters").join("week_06");
        fs::create_dir_all(&week_dir).unwrap();
        let ctx = GateCtx {
            root,
            week: "week_06".to_string(),
            week_dir,
            mode,
            verbose: false,
            python: "python3".to_string(),
            test_timeout: None,
        };
        (tmp, ctx)
    }

    fn write(ctx: &GateCtx, rel: &str, content: &str) {
        let path = ctx.week_dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_week_dir_short_circuits() {
        let (_tmp, mut ctx) = ctx_for(Mode::Task);
        ctx.week_dir = ctx.root.join("chapters").join("week_99");
        ctx.week = "week_99".to_string();
        let problems = run_gate(&ctx);
        assert_eq!(problems, vec!["missing week dir: chapters/week_99/".to_string()]);
    }

    #[test]
    fn structural_problems_are_cumulative() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        let mut problems = Vec::new();
        check_required_paths(&ctx, &mut problems);
        // 7 files + 3 dirs, all missing, each reported independently
        assert_eq!(problems.len(), 10);
        assert!(problems[0].contains("CHAPTER.md"));
        assert!(problems.iter().all(|p| p.starts_with("missing required")));
    }

    #[test]
    fn tests_dir_must_hold_a_test_file() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        fs::create_dir_all(ctx.week_dir.join("tests")).unwrap();
        write(&ctx, "tests/helper.py", "");
        let mut problems = Vec::new();
        check_required_paths(&ctx, &mut problems);
        assert!(problems.iter().any(|p| p.contains("no test_*.py files")));

        write(&ctx, "tests/test_week06.py", "def test_ok(): pass\n");
        let mut problems = Vec::new();
        check_required_paths(&ctx, &mut problems);
        assert!(!problems.iter().any(|p| p.contains("no test_*.py files")));
    }

    #[test]
    fn examples_dir_needs_python_sources() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        fs::create_dir_all(ctx.week_dir.join("examples")).unwrap();
        let mut problems = Vec::new();
        check_examples_exist(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("examples/ has no .py files"));

        write(&ctx, "examples/01_intro.py", "print('hi')\n");
        let mut problems = Vec::new();
        check_examples_exist(&ctx, &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn dod_keyword_is_required() {
        let (_tmp, ctx) = ctx_for(Mode::Task);
        write(&ctx, "CHAPTER.md", "# Chapter\nsome prose\n");
        let mut problems = Vec::new();
        check_chapter_dod(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);

        for spelling in ["DoD", "Definition of Done", "本周 DoD"] {
            write(&ctx, "CHAPTER.md", &format!("# Chapter\n{}\n", spelling));
            let mut problems = Vec::new();
            check_chapter_dod(&ctx, &mut problems);
            assert!(problems.is_empty(), "spelling {:?} should pass", spelling);
        }
    }

    #[test]
    fn empty_chapter_is_one_problem() {
        let (_tmp, ctx) = ctx_for(Mode::Task);
        write(&ctx, "CHAPTER.md", "\n  \n\n");
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert_eq!(problems, vec!["CHAPTER.md is empty".to_string()]);
    }

    fn chapter_with_ratio(todo: usize, total: usize) -> String {
        let mut text = String::new();
        for i in 0..total {
            if i < todo {
                text.push_str("TODO fill this in\n");
            } else {
                text.push_str("real content line\n");
            }
        }
        text
    }

    #[test]
    fn release_threshold_is_stricter_than_task() {
        // 30% placeholder: fails release, passes task/idle
        let (_tmp, mut ctx) = ctx_for(Mode::Release);
        write(&ctx, "CHAPTER.md", &chapter_with_ratio(3, 10));
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("release requires <=20%"));

        ctx.mode = Mode::Task;
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn half_placeholder_fails_every_mode() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        write(&ctx, "CHAPTER.md", &chapter_with_ratio(6, 10));
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("still a skeleton"));
    }

    #[test]
    fn passing_release_ratio_passes_task_too() {
        // monotonic strictness: below both thresholds in release implies
        // below the any-mode threshold as well
        let (_tmp, mut ctx) = ctx_for(Mode::Release);
        write(&ctx, "CHAPTER.md", &chapter_with_ratio(1, 10));
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert!(problems.is_empty());

        ctx.mode = Mode::Task;
        let mut problems = Vec::new();
        check_chapter_content(&ctx, &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn default_template_is_flagged() {
        let (_tmp, ctx) = ctx_for(Mode::Release);
        write(
            &ctx,
            "starter_code/solution.py",
            "def transform(text):\n    # Default: identity transform\n    return text\n",
        );
        let mut problems = Vec::new();
        check_solution_customized(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("default template"));

        write(
            &ctx,
            "starter_code/solution.py",
            "def transform(text):\n    return text.upper()\n",
        );
        let mut problems = Vec::new();
        check_solution_customized(&ctx, &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn qa_missing_section_is_a_problem() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        write(&ctx, "QA_REPORT.md", "# QA\n\nall good\n");
        let mut problems = Vec::new();
        check_qa_blocking(&ctx, &ctx.week_dir.join("QA_REPORT.md"), &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("missing '## 阻塞项' section"));
    }

    #[test]
    fn unchecked_blocking_item_fails_once() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        write(
            &ctx,
            "QA_REPORT.md",
            "# QA\n\n## 阻塞项\n\n- [ ] first\n- [ ] second\n\n## 其他\n",
        );
        let mut problems = Vec::new();
        check_qa_blocking(&ctx, &ctx.week_dir.join("QA_REPORT.md"), &mut problems);
        // one unresolved item fails the unit; scanning stops there
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("QA blocking item not resolved"));
    }

    #[test]
    fn commented_blocking_items_are_ignored() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        write(
            &ctx,
            "QA_REPORT.md",
            "## 阻塞项\n\n<!--\n- [ ] inside a comment\n-->\n<!-- - [ ] one-liner -->\n- [x] resolved\n",
        );
        let mut problems = Vec::new();
        check_qa_blocking(&ctx, &ctx.week_dir.join("QA_REPORT.md"), &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn blocking_items_outside_section_are_ignored() {
        let (_tmp, ctx) = ctx_for(Mode::Idle);
        write(
            &ctx,
            "QA_REPORT.md",
            "## 阻塞项\n\n- [x] resolved\n\n## 待办\n\n- [ ] unrelated backlog\n",
        );
        let mut problems = Vec::new();
        check_qa_blocking(&ctx, &ctx.week_dir.join("QA_REPORT.md"), &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn failing_test_engine_surfaces_output() {
        let (_tmp, mut ctx) = ctx_for(Mode::Task);
        // `false` ignores its arguments and exits 1 with no output
        ctx.python = "false".to_string();
        let mut problems = Vec::new();
        run_week_tests(&ctx, &mut problems);
        assert_eq!(problems, vec!["pytest failed".to_string()]);
    }

    #[test]
    fn passing_test_engine_appends_nothing() {
        let (_tmp, mut ctx) = ctx_for(Mode::Task);
        ctx.python = "true".to_string();
        let mut problems = Vec::new();
        run_week_tests(&ctx, &mut problems);
        assert!(problems.is_empty());
    }

    #[test]
    fn missing_test_engine_degrades_to_a_problem() {
        let (_tmp, mut ctx) = ctx_for(Mode::Task);
        ctx.python = "definitely-not-a-real-interpreter".to_string();
        let mut problems = Vec::new();
        run_week_tests(&ctx, &mut problems);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("failed to run pytest:"));
    }

    #[test]
    fn bounded_wait_kills_a_hung_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let outcome = run_with_timeout(&mut cmd, Duration::from_millis(150)).unwrap();
        assert!(matches!(outcome, TestOutcome::TimedOut));
    }

    #[test]
    fn bounded_wait_returns_fast_child_output() {
        let mut cmd = Command::new("true");
        let outcome = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        match outcome {
            TestOutcome::Completed(out) => assert!(out.status.success()),
            TestOutcome::TimedOut => panic!("fast child should not time out"),
        }
    }
}
