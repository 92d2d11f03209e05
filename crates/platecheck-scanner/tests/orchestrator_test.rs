use async_trait::async_trait;
use platecheck_captcha::{CaptchaError, CaptchaImageSource, CaptchaSolver};
use platecheck_core::{CaptchaAnswer, LookupRequest};
use platecheck_scanner::{
    LookupError, LookupForm, LookupOrchestrator, SessionFactory, SiteSession, TokenBucket,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const ACCEPTED: &str = r#"{"success":1,"href":"/tra-cuu-ket-qua?id=42","error":""}"#;

/// Scripted site shared by every session a factory opens.
#[derive(Default)]
struct SiteScript {
    /// Submit bodies in order; the last one repeats
    submit_bodies: Mutex<VecDeque<String>>,
    /// Result page responses in order
    pages: Mutex<VecDeque<Result<String, LookupError>>>,
    sessions_opened: AtomicU32,
    submits: AtomicU32,
    fetch_times: Mutex<Vec<Instant>>,
    forms: Mutex<Vec<(String, String, String)>>,
}

impl SiteScript {
    fn with_submits(bodies: &[&str]) -> Arc<Self> {
        let script = Self::default();
        *script.submit_bodies.lock().expect("lock") = bodies.iter().map(|b| (*b).to_string()).collect();
        Arc::new(script)
    }

    fn push_page(&self, page: Result<String, LookupError>) {
        self.pages.lock().expect("lock").push_back(page);
    }

    fn fetches(&self) -> usize {
        self.fetch_times.lock().expect("lock").len()
    }
}

struct ScriptedFactory(Arc<SiteScript>);

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> platecheck_scanner::Result<Box<dyn SiteSession>> {
        let id = self.0.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.0),
            id,
        }))
    }
}

struct ScriptedSession {
    script: Arc<SiteScript>,
    id: u32,
}

#[async_trait]
impl CaptchaImageSource for ScriptedSession {
    async fn captcha_image(&self) -> platecheck_captcha::Result<Vec<u8>> {
        Ok(self.id.to_be_bytes().to_vec())
    }
}

#[async_trait]
impl SiteSession for ScriptedSession {
    fn as_image_source(&self) -> &dyn CaptchaImageSource {
        self
    }

    async fn submit_lookup(&self, form: &LookupForm<'_>) -> platecheck_scanner::Result<Vec<u8>> {
        self.script.submits.fetch_add(1, Ordering::SeqCst);
        self.script.forms.lock().expect("lock").push((
            form.license_plate.to_string(),
            form.vehicle_type.to_string(),
            form.captcha.to_string(),
        ));

        let mut bodies = self.script.submit_bodies.lock().expect("lock");
        let body = if bodies.len() > 1 {
            bodies.pop_front().unwrap_or_default()
        } else {
            bodies.front().cloned().unwrap_or_default()
        };
        Ok(body.into_bytes())
    }

    async fn fetch_result_page(&self, href: &str) -> platecheck_scanner::Result<String> {
        assert_eq!(href, "/tra-cuu-ket-qua?id=42");
        self.script.fetch_times.lock().expect("lock").push(Instant::now());
        self.script
            .pages
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(LookupError::Parse("no page scripted".to_string())))
    }
}

/// Answers with the session id so tests can check answers are per session.
#[derive(Default)]
struct SessionBoundSolver {
    calls: AtomicU32,
}

#[async_trait]
impl CaptchaSolver for SessionBoundSolver {
    async fn solve(&self, source: &dyn CaptchaImageSource) -> platecheck_captcha::Result<CaptchaAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = source.captcha_image().await?;
        let id = u32::from_be_bytes(bytes.try_into().expect("four id bytes"));
        Ok(CaptchaAnswer::new(format!("ans{id}")).expect("valid answer"))
    }
}

#[derive(Default)]
struct FailingSolver {
    calls: AtomicU32,
}

#[async_trait]
impl CaptchaSolver for FailingSolver {
    async fn solve(&self, _source: &dyn CaptchaImageSource) -> platecheck_captcha::Result<CaptchaAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CaptchaError::AllEnginesFailed {
            failures: vec!["tesseract: no text".to_string()],
        })
    }
}

fn orchestrator(script: &Arc<SiteScript>, solver: Arc<dyn CaptchaSolver>) -> LookupOrchestrator {
    LookupOrchestrator::new(Arc::new(ScriptedFactory(Arc::clone(script))), solver)
        .expect("create orchestrator")
}

fn request() -> LookupRequest {
    LookupRequest::new("30A12345", "1").expect("valid request")
}

fn result_page() -> String {
    let rows = [
        ("Biển kiểm soát:", "30A-123.45"),
        ("Màu biển:", "Nền mầu trắng, chữ và số màu đen"),
        ("Loại phương tiện:", "Ô tô"),
        ("Thời gian vi phạm:", "09:41, 12/05/2024"),
        ("Địa điểm vi phạm:", "Đại lộ Thăng Long, Hà Nội"),
        ("Hành vi vi phạm:", "Điều khiển xe chạy quá tốc độ quy định"),
        ("Trạng thái:", "Chưa xử phạt"),
        ("Đơn vị phát hiện vi phạm:", "Đội CSGT số 6"),
        (
            "Nơi giải quyết vụ việc:",
            "1. Đội CSGT số 6\nĐịa chỉ: Km 5 Đại lộ Thăng Long",
        ),
    ];
    let groups: String = rows
        .iter()
        .map(|(label, value)| {
            format!(
                r#"<div class="form-group"><label class="col-md-3">{label}</label>
                <div class="col-md-9">{value}</div></div>
"#
            )
        })
        .collect();
    format!(r#"<html><body><div id="bodyPrint123">{groups}</div></body></html>"#)
}

#[tokio::test]
async fn test_rejection_exhausts_after_nine_attempts() {
    let script = SiteScript::with_submits(&["404"]);
    let solver = Arc::new(SessionBoundSolver::default());
    let orchestrator = orchestrator(&script, solver.clone());

    let err = orchestrator
        .check_license_plate(&request())
        .await
        .expect_err("every CAPTCHA is rejected");

    assert!(matches!(err, LookupError::ValidationExhausted { attempts: 9 }));
    assert_eq!(err.to_string(), "captcha validation failed after 9 attempts");
    assert_eq!(script.sessions_opened.load(Ordering::SeqCst), 9);
    assert_eq!(script.submits.load(Ordering::SeqCst), 9);
    assert_eq!(solver.calls.load(Ordering::SeqCst), 9);
    assert_eq!(script.fetches(), 0);
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    script.push_page(Ok(result_page()));
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("lookup succeeds");

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.href, "/tra-cuu-ket-qua?id=42");
    assert_eq!(outcome.error, "");
    assert_eq!(outcome.violation_count(), 1);

    let violation = &outcome.details.as_ref().expect("details").violations[0];
    assert_eq!(violation.license_plate, "30A-123.45");
    assert_eq!(violation.plate_color, "Nền mầu trắng, chữ và số màu đen");
    assert_eq!(violation.vehicle_type, "Ô tô");
    assert_eq!(violation.violation_time, "09:41, 12/05/2024");
    assert_eq!(violation.location, "Đại lộ Thăng Long, Hà Nội");
    assert_eq!(violation.behavior, "Điều khiển xe chạy quá tốc độ quy định");
    assert_eq!(violation.status, "Chưa xử phạt");
    assert_eq!(violation.detecting_unit, "Đội CSGT số 6");
    assert_eq!(violation.resolution_point, "Km 5 Đại lộ Thăng Long");

    let forms = script.forms.lock().expect("lock");
    assert_eq!(
        forms.as_slice(),
        &[("30A12345".to_string(), "1".to_string(), "ans1".to_string())]
    );
}

#[tokio::test]
async fn test_new_session_per_attempt() {
    let script = SiteScript::with_submits(&["404", "\u{feff}404", ACCEPTED]);
    script.push_page(Ok(result_page()));
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("third attempt succeeds");

    assert_eq!(outcome.attempts, 3);
    assert_eq!(script.sessions_opened.load(Ordering::SeqCst), 3);

    let answers: Vec<String> = script
        .forms
        .lock()
        .expect("lock")
        .iter()
        .map(|(_, _, captcha)| captcha.clone())
        .collect();
    assert_eq!(answers, vec!["ans1", "ans2", "ans3"]);
}

#[tokio::test]
async fn test_server_code_aborts() {
    let script = SiteScript::with_submits(&["500"]);
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let err = orchestrator
        .check_license_plate(&request())
        .await
        .expect_err("server code is fatal");

    assert!(matches!(err, LookupError::ServerCode { code: 500 }));
    assert_eq!(script.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unparseable_submit_body_aborts() {
    let script = SiteScript::with_submits(&["<html>Service Unavailable</html>"]);
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let err = orchestrator
        .check_license_plate(&request())
        .await
        .expect_err("body is not JSON");

    assert!(matches!(err, LookupError::Parse(_)));
    assert_eq!(script.sessions_opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ocr_failure_aborts_by_default() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    let solver = Arc::new(FailingSolver::default());
    let orchestrator = orchestrator(&script, solver.clone());

    let err = orchestrator
        .check_license_plate(&request())
        .await
        .expect_err("OCR fails");

    assert!(matches!(err, LookupError::Captcha(CaptchaError::AllEnginesFailed { .. })));
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(script.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ocr_failure_retried_when_enabled() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    let solver = Arc::new(FailingSolver::default());
    let orchestrator = orchestrator(&script, solver.clone()).with_retry_on_ocr_failure(true);

    let err = orchestrator
        .check_license_plate(&request())
        .await
        .expect_err("OCR always fails");

    assert!(matches!(err, LookupError::ValidationExhausted { attempts: 9 }));
    assert_eq!(solver.calls.load(Ordering::SeqCst), 9);
    assert_eq!(script.sessions_opened.load(Ordering::SeqCst), 9);
}

#[tokio::test(start_paused = true)]
async fn test_result_fetch_backoff_then_give_up() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    for _ in 0..3 {
        script.push_page(Err(LookupError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))));
    }
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let start = Instant::now();
    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("accepted lookup succeeds without details");

    assert!(outcome.success);
    assert!(outcome.details.is_none());
    assert_eq!(outcome.violation_count(), 0);

    let times = script.fetch_times.lock().expect("lock").clone();
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= Duration::from_secs(1));
    assert!(times[2] - times[1] >= Duration::from_secs(2));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_result_fetch_recovers() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    script.push_page(Err(LookupError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        "timed out",
    ))));
    script.push_page(Ok(result_page()));
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("lookup succeeds");

    assert_eq!(outcome.violation_count(), 1);
    assert_eq!(script.fetches(), 2);
}

#[tokio::test]
async fn test_result_parse_error_not_retried() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    script.push_page(Err(LookupError::Parse("truncated page".to_string())));
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("lookup succeeds");

    assert!(outcome.details.is_none());
    assert_eq!(script.fetches(), 1);
}

#[tokio::test]
async fn test_message_page() {
    let script = SiteScript::with_submits(&[ACCEPTED]);
    script.push_page(Ok(
        r#"<div id="bodyPrint123"><p>Không tìm thấy kết quả !</p></div>"#.to_string(),
    ));
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("lookup succeeds");

    let details = outcome.details.expect("message details");
    assert!(details.violations.is_empty());
    assert_eq!(details.message.as_deref(), Some("Không tìm thấy kết quả !"));
}

#[tokio::test]
async fn test_no_href_skips_fetch() {
    let script = SiteScript::with_submits(&[r#"{"success":"false","href":"","error":"Sai mã"}"#]);
    let orchestrator = orchestrator(&script, Arc::new(SessionBoundSolver::default()));

    let outcome = orchestrator
        .check_license_plate(&request())
        .await
        .expect("site answer is returned as-is");

    assert!(!outcome.success);
    assert_eq!(outcome.error, "Sai mã");
    assert!(outcome.details.is_none());
    assert_eq!(script.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_global_rate_limit_gates_lookups() {
    let script = SiteScript::with_submits(&[r#"{"success":true}"#]);
    let bucket = Arc::new(TokenBucket::new(1, Duration::from_millis(500)));
    let orchestrator =
        orchestrator(&script, Arc::new(SessionBoundSolver::default())).with_rate_limiter(bucket);

    let start = Instant::now();
    orchestrator.check_license_plate(&request()).await.expect("first");
    orchestrator.check_license_plate(&request()).await.expect("second");

    assert!(start.elapsed() >= Duration::from_millis(500));
}
