use crate::chart::{self, ComparisonChart};
use crate::db::{Store, APP_DATA_KEY, ONBOARDING_KEY};
use crate::evaluation::{EvaluationError, EvaluationRequest, Evaluator};
use crate::imaging::{self, NormalizeOptions};
use crate::model::{
    ArchivedReport, ClassGroup, Evaluation, Snapshot, Student, StudentStatus, UNKNOWN_CLASS_NAME,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    BadInput(String),
    #[error("student has no work image")]
    NoImage,
    #[error("import replaces all data and must be confirmed")]
    ConfirmationRequired,
    #[error("import document could not be parsed: {0}")]
    ImportParse(String),
    #[error("image could not be decoded: {0}")]
    ImageDecode(String),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

impl ControllerError {
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::NotFound { .. } => "not_found",
            ControllerError::BadInput(_) => "bad_params",
            ControllerError::NoImage => "no_image",
            ControllerError::ConfirmationRequired => "confirmation_required",
            ControllerError::ImportParse(_) => "import_parse_failed",
            ControllerError::ImageDecode(_) => "image_decode_failed",
            ControllerError::Evaluation(e) => e.code(),
        }
    }

    fn not_found(kind: &'static str, id: &str) -> Self {
        ControllerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

/// Process-lifetime state that is never written to the snapshot.
/// Starts empty; onboarding visibility is filled in by `load`.
#[derive(Debug, Default)]
pub struct Session {
    pub active_grade_id: Option<String>,
    pub active_student_id: Option<String>,
    pub viewing_report_id: Option<String>,
    pub comparison: Vec<String>,
    pub show_onboarding: bool,
    pending: HashMap<String, u64>,
    next_token: u64,
}

impl Session {
    pub fn loading(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn is_pending(&self, student_id: &str) -> bool {
        self.pending.contains_key(student_id)
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    pub student_id: String,
    pub token: u64,
    pub request: EvaluationRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Applied(Evaluation),
    /// A newer request for the same student was issued; this response was dropped.
    Stale,
}

/// Owns the canonical in-memory state. Every mutation goes through here and
/// is followed by a full snapshot write once the initial load has happened.
pub struct Controller {
    data: Snapshot,
    session: Session,
    store: Option<Store>,
    loaded: bool,
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller {
    pub fn new() -> Self {
        Self {
            data: Snapshot::default(),
            session: Session::default(),
            store: None,
            loaded: false,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.data
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replaces the backing store and loads from it.
    pub fn attach_store(&mut self, store: Store) {
        self.store = Some(store);
        self.loaded = false;
        self.load();
    }

    /// The only place state is populated from storage. Read or parse failures
    /// fall back to empty collections.
    pub fn load(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        self.data = match store.get(APP_DATA_KEY) {
            Ok(Some(text)) => match Snapshot::from_json_tolerant(&text) {
                Ok(snap) => snap,
                Err(e) => {
                    warn!(error = %e, "stored snapshot is malformed; starting empty");
                    Snapshot::default()
                }
            },
            Ok(None) => Snapshot::default(),
            Err(e) => {
                warn!(error = %e, "failed to read snapshot; starting empty");
                Snapshot::default()
            }
        };

        let seen = store.get_flag(ONBOARDING_KEY).unwrap_or_else(|e| {
            warn!(error = %e, "failed to read onboarding flag");
            false
        });
        self.session = Session {
            show_onboarding: !seen,
            ..Session::default()
        };
        self.loaded = true;

        info!(
            classes = self.data.grades.len(),
            students = self.data.students.len(),
            reports = self.data.saved_reports.len(),
            "state loaded"
        );
    }

    /// Best-effort mirror of the in-memory state. Never fails the caller.
    pub fn save(&self) {
        if !self.loaded {
            debug!("save suppressed before initial load");
            return;
        }
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let text = match serde_json::to_string(&self.data) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialize snapshot");
                return;
            }
        };
        if let Err(e) = store.put(APP_DATA_KEY, &text) {
            warn!(error = %e, "failed to persist snapshot");
        }
    }

    fn student(&self, student_id: &str) -> Result<&Student> {
        self.data
            .students
            .iter()
            .find(|s| s.id == student_id)
            .ok_or_else(|| ControllerError::not_found("student", student_id))
    }

    fn student_mut(&mut self, student_id: &str) -> Result<&mut Student> {
        self.data
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| ControllerError::not_found("student", student_id))
    }

    pub fn get_student(&self, student_id: &str) -> Result<&Student> {
        self.student(student_id)
    }

    pub fn students_in<'a>(&'a self, grade_id: &'a str) -> impl Iterator<Item = &'a Student> + Clone {
        self.data
            .students
            .iter()
            .filter(move |s| s.grade_id == grade_id)
    }

    pub fn grade_name_or_unknown(&self, grade_id: &str) -> String {
        self.data
            .grade_name(grade_id)
            .unwrap_or(UNKNOWN_CLASS_NAME)
            .to_string()
    }

    pub fn create_class(&mut self, name: &str) -> Result<ClassGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::BadInput("name must not be empty".into()));
        }
        let class = ClassGroup {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.data.grades.push(class.clone());
        self.session.active_grade_id = Some(class.id.clone());
        self.save();
        Ok(class)
    }

    /// Removes the class and every student that references it in one step.
    /// Archived reports are independent and stay.
    pub fn delete_class(&mut self, grade_id: &str) -> Result<usize> {
        if !self.data.grades.iter().any(|g| g.id == grade_id) {
            return Err(ControllerError::not_found("class", grade_id));
        }

        let removed: Vec<String> = self
            .students_in(grade_id)
            .map(|s| s.id.clone())
            .collect();
        self.data.grades.retain(|g| g.id != grade_id);
        self.data.students.retain(|s| s.grade_id != grade_id);

        if self.session.active_grade_id.as_deref() == Some(grade_id) {
            self.session.active_grade_id = None;
        }
        if let Some(active) = self.session.active_student_id.as_ref() {
            if removed.contains(active) {
                self.session.active_student_id = None;
            }
        }
        self.session.comparison.retain(|id| !removed.contains(id));
        for id in &removed {
            self.session.pending.remove(id);
        }

        self.save();
        Ok(removed.len())
    }

    pub fn select_class(&mut self, grade_id: Option<&str>) -> Result<()> {
        if let Some(id) = grade_id {
            if !self.data.grades.iter().any(|g| g.id == id) {
                return Err(ControllerError::not_found("class", id));
            }
        }
        if self.session.active_grade_id.as_deref() != grade_id {
            self.session.active_student_id = None;
        }
        self.session.active_grade_id = grade_id.map(str::to_string);
        Ok(())
    }

    pub fn create_student(&mut self, grade_id: &str, name: &str) -> Result<Student> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ControllerError::BadInput("name must not be empty".into()));
        }
        if !self.data.grades.iter().any(|g| g.id == grade_id) {
            return Err(ControllerError::not_found("class", grade_id));
        }
        let student = Student {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            grade_id: grade_id.to_string(),
            work_image: None,
            extracted_text: None,
            evaluation: None,
            evaluation_stale: false,
        };
        self.data.students.push(student.clone());
        self.save();
        Ok(student)
    }

    pub fn select_student(&mut self, student_id: Option<&str>) -> Result<()> {
        if let Some(id) = student_id {
            let grade_id = self.student(id)?.grade_id.clone();
            self.session.active_grade_id = Some(grade_id);
        }
        self.session.active_student_id = student_id.map(str::to_string);
        Ok(())
    }

    /// Normalizes and stores a new work image. A decode failure leaves the
    /// student untouched. Any existing evaluation stops being current.
    pub fn attach_image(
        &mut self,
        student_id: &str,
        raw: &[u8],
        opts: NormalizeOptions,
    ) -> Result<StudentStatus> {
        self.student(student_id)?;
        let normalized = imaging::normalize_bytes(raw, opts).map_err(|e| {
            warn!(student = student_id, error = %e, "work image could not be decoded");
            ControllerError::ImageDecode(format!("{e:#}"))
        })?;
        debug!(
            student = student_id,
            width = normalized.width,
            height = normalized.height,
            bytes = normalized.byte_len,
            "work image normalized"
        );

        let student = self.student_mut(student_id)?;
        student.work_image = Some(normalized.data_url);
        student.evaluation_stale = student.evaluation.is_some();
        let status = student.status();
        self.save();
        Ok(status)
    }

    pub fn attach_evaluation(&mut self, student_id: &str, evaluation: Evaluation) -> Result<StudentStatus> {
        let student = self.student_mut(student_id)?;
        if student.work_image.is_none() {
            return Err(ControllerError::NoImage);
        }
        student.extracted_text = Some(evaluation.transcribed_text.clone());
        student.evaluation = Some(evaluation);
        student.evaluation_stale = false;
        let status = student.status();
        self.session.active_student_id = Some(student_id.to_string());
        self.save();
        Ok(status)
    }

    /// Issues a fresh token for this student; any earlier outstanding request
    /// for the same student becomes stale.
    pub fn begin_analysis(&mut self, student_id: &str) -> Result<AnalysisTicket> {
        let student = self.student(student_id)?;
        let Some(image) = student.work_image.clone() else {
            return Err(ControllerError::NoImage);
        };
        let request = EvaluationRequest {
            image,
            class_name: self.grade_name_or_unknown(&student.grade_id),
            reference_text: self.data.reference_text.clone(),
        };

        self.session.next_token += 1;
        let token = self.session.next_token;
        self.session.pending.insert(student_id.to_string(), token);
        Ok(AnalysisTicket {
            student_id: student_id.to_string(),
            token,
            request,
        })
    }

    pub fn finish_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        outcome: std::result::Result<Evaluation, EvaluationError>,
    ) -> Result<AnalysisOutcome> {
        let current = self.session.pending.get(&ticket.student_id).copied();
        if current != Some(ticket.token) {
            debug!(
                student = %ticket.student_id,
                token = ticket.token,
                "discarding stale evaluation response"
            );
            return Ok(AnalysisOutcome::Stale);
        }
        self.session.pending.remove(&ticket.student_id);

        match outcome {
            Ok(evaluation) => {
                self.attach_evaluation(&ticket.student_id, evaluation.clone())?;
                Ok(AnalysisOutcome::Applied(evaluation))
            }
            Err(e) => {
                warn!(student = %ticket.student_id, error = %e, "evaluation failed");
                Err(e.into())
            }
        }
    }

    pub fn analyze(&mut self, student_id: &str, evaluator: &dyn Evaluator) -> Result<AnalysisOutcome> {
        let ticket = self.begin_analysis(student_id)?;
        let outcome = evaluator.evaluate(&ticket.request);
        self.finish_analysis(&ticket, outcome)
    }

    /// Copies the student's evaluation into a new report at the front of the
    /// archive. A stale evaluation is still archived. Returns `None` when the
    /// student has never been evaluated.
    pub fn archive_student(&mut self, student_id: &str) -> Result<Option<ArchivedReport>> {
        let student = self.student(student_id)?;
        let Some(evaluation) = student.evaluation.as_ref() else {
            return Ok(None);
        };
        let report = ArchivedReport {
            id: Uuid::new_v4().to_string(),
            student_name: student.name.clone(),
            grade_name: self.grade_name_or_unknown(&student.grade_id),
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            evaluation: evaluation.clone(),
            work_image: student.work_image.clone(),
        };
        self.data.saved_reports.insert(0, report.clone());
        self.save();
        Ok(Some(report))
    }

    pub fn get_report(&self, report_id: &str) -> Result<&ArchivedReport> {
        self.data
            .saved_reports
            .iter()
            .find(|r| r.id == report_id)
            .ok_or_else(|| ControllerError::not_found("report", report_id))
    }

    pub fn view_report(&mut self, report_id: Option<&str>) -> Result<()> {
        if let Some(id) = report_id {
            self.get_report(id)?;
        }
        self.session.viewing_report_id = report_id.map(str::to_string);
        Ok(())
    }

    pub fn delete_report(&mut self, report_id: &str) -> Result<()> {
        let before = self.data.saved_reports.len();
        self.data.saved_reports.retain(|r| r.id != report_id);
        if self.data.saved_reports.len() == before {
            return Err(ControllerError::not_found("report", report_id));
        }
        if self.session.viewing_report_id.as_deref() == Some(report_id) {
            self.session.viewing_report_id = None;
        }
        self.save();
        Ok(())
    }

    pub fn set_reference_text(&mut self, text: &str) {
        self.data.reference_text = text.to_string();
        self.save();
    }

    pub fn export_document(&self) -> Snapshot {
        self.data.clone()
    }

    /// Replaces the whole aggregate. Nothing changes unless the document parses.
    pub fn import_document(&mut self, text: &str, confirmed: bool) -> Result<()> {
        let snap = Snapshot::from_json_tolerant(text).map_err(|e| {
            warn!(error = %e, "import document rejected");
            ControllerError::ImportParse(e.to_string())
        })?;
        if !confirmed {
            return Err(ControllerError::ConfirmationRequired);
        }
        self.replace(snap);
        Ok(())
    }

    pub fn replace(&mut self, snap: Snapshot) {
        self.data = snap;
        let show_onboarding = self.session.show_onboarding;
        self.session = Session {
            show_onboarding,
            ..Session::default()
        };
        self.save();
    }

    /// Returns whether the student is selected after the toggle.
    pub fn toggle_comparison(&mut self, student_id: &str) -> Result<bool> {
        self.student(student_id)?;
        let cmp = &mut self.session.comparison;
        if let Some(pos) = cmp.iter().position(|id| id == student_id) {
            cmp.remove(pos);
            Ok(false)
        } else {
            cmp.push(student_id.to_string());
            Ok(true)
        }
    }

    pub fn clear_comparison(&mut self) {
        self.session.comparison.clear();
    }

    pub fn comparison_chart(&self, grade_id: Option<&str>) -> ComparisonChart {
        match grade_id {
            Some(g) => chart::comparison(&self.session.comparison, self.students_in(g)),
            None => chart::comparison(&self.session.comparison, self.data.students.iter()),
        }
    }

    pub fn dismiss_onboarding(&mut self) {
        self.session.show_onboarding = false;
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.set_flag(ONBOARDING_KEY, true) {
                warn!(error = %e, "failed to persist onboarding flag");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Suggestion;
    use image::{ImageBuffer, ImageOutputFormat, Rgb};
    use std::cell::Cell;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let buf = ImageBuffer::from_pixel(width, height, Rgb([250u8, 250, 250]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(buf)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .expect("encode png");
        out
    }

    fn evaluation(overall: f64) -> Evaluation {
        Evaluation {
            handwriting_score: 75.0,
            originality_score: 70.0,
            creativity_score: 68.0,
            overall_score: overall,
            punctuation_errors: vec!["missing comma".into()],
            concept_knowledge: "solid".into(),
            transcribed_text: "Bir varmis bir yokmus".into(),
            plagiarism_note: "none".into(),
            weaknesses: vec!["spacing".into()],
            suggestions: vec![Suggestion {
                topic: "spacing".into(),
                action: "copy a paragraph daily".into(),
            }],
        }
    }

    fn loaded() -> Controller {
        let mut c = Controller::new();
        c.attach_store(Store::open_in_memory().expect("store"));
        c
    }

    struct CountingEvaluator {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Evaluator for CountingEvaluator {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn evaluate(
            &self,
            request: &EvaluationRequest,
        ) -> std::result::Result<Evaluation, EvaluationError> {
            self.calls.set(self.calls.get() + 1);
            assert!(request.image.starts_with("data:image/jpeg;base64,"));
            if self.fail {
                return Err(EvaluationError::Transport("offline".into()));
            }
            Ok(evaluation(82.0))
        }
    }

    #[test]
    fn scenario_create_evaluate_archive() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let ali = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&ali.id, &png(40, 20), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&ali.id, evaluation(82.0)).expect("eval");

        let report = c.archive_student(&ali.id).expect("archive").expect("report");
        let archived = &c.snapshot().saved_reports;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].student_name, "Ali");
        assert_eq!(archived[0].grade_name, "5A");
        assert_eq!(archived[0].id, report.id);
        assert_eq!(archived[0].evaluation.overall_score, 82.0);
    }

    #[test]
    fn archive_is_a_copy_and_newest_first() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ayse").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(60.0)).expect("eval");
        let first = c.archive_student(&s.id).expect("archive").expect("report");

        c.attach_image(&s.id, &png(12, 12), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(90.0)).expect("eval");
        let second = c.archive_student(&s.id).expect("archive").expect("report");

        let reports = &c.snapshot().saved_reports;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, second.id);
        assert_eq!(reports[1].id, first.id);
        assert_eq!(reports[1].evaluation.overall_score, 60.0);
        assert_eq!(reports[0].evaluation.overall_score, 90.0);
    }

    #[test]
    fn archive_without_evaluation_is_noop() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Can").expect("student");
        assert!(c.archive_student(&s.id).expect("archive").is_none());
        assert!(c.snapshot().saved_reports.is_empty());
    }

    #[test]
    fn delete_class_cascades_students_but_keeps_reports() {
        let mut c = loaded();
        let a = c.create_class("5A").expect("class");
        let b = c.create_class("5B").expect("class");
        let ali = c.create_student(&a.id, "Ali").expect("student");
        c.create_student(&a.id, "Veli").expect("student");
        let zeynep = c.create_student(&b.id, "Zeynep").expect("student");
        c.attach_image(&ali.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&ali.id, evaluation(82.0)).expect("eval");
        c.archive_student(&ali.id).expect("archive");
        c.toggle_comparison(&ali.id).expect("toggle");
        c.toggle_comparison(&zeynep.id).expect("toggle");
        c.select_class(Some(&a.id)).expect("select");
        c.select_student(Some(&ali.id)).expect("select");

        assert_eq!(c.delete_class(&a.id).expect("delete"), 2);

        let snap = c.snapshot();
        assert!(snap.grades.iter().all(|g| g.id != a.id));
        assert!(snap.students.iter().all(|s| s.grade_id != a.id));
        assert!(snap
            .students
            .iter()
            .all(|s| snap.grades.iter().any(|g| g.id == s.grade_id)));
        assert_eq!(snap.students.len(), 1);
        assert_eq!(snap.saved_reports.len(), 1);
        assert_eq!(snap.saved_reports[0].student_name, "Ali");
        assert_eq!(c.session().active_grade_id, None);
        assert_eq!(c.session().active_student_id, None);
        assert_eq!(c.session().comparison, vec![zeynep.id]);
    }

    #[test]
    fn new_image_clears_evaluated_status_only() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        let other = c.create_student(&class.id, "Veli").expect("student");
        assert_eq!(
            c.get_student(&s.id).expect("student").status(),
            StudentStatus::NoImage
        );
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(82.0)).expect("eval");
        assert_eq!(
            c.get_student(&s.id).expect("student").status(),
            StudentStatus::Evaluated
        );

        let status = c
            .attach_image(&s.id, &png(20, 10), NormalizeOptions::default())
            .expect("image");
        assert_eq!(status, StudentStatus::ImagePending);
        let student = c.get_student(&s.id).expect("student");
        assert!(student.evaluation.is_some());
        assert!(student.current_evaluation().is_none());
        assert_eq!(c.snapshot().grades.len(), 1);
        assert!(c.get_student(&other.id).is_ok());
    }

    #[test]
    fn stale_evaluation_is_still_archived() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(82.0)).expect("eval");
        c.attach_image(&s.id, &png(20, 10), NormalizeOptions::default())
            .expect("image");

        let report = c.archive_student(&s.id).expect("archive").expect("report");
        assert_eq!(c.snapshot().saved_reports.len(), 1);
        assert_eq!(report.evaluation.overall_score, 82.0);
        assert_eq!(
            report.work_image,
            c.get_student(&s.id).expect("student").work_image
        );
    }

    #[test]
    fn bad_image_leaves_student_unchanged() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        let err = c
            .attach_image(&s.id, b"garbage", NormalizeOptions::default())
            .unwrap_err();
        assert_eq!(err.code(), "image_decode_failed");
        assert!(c.get_student(&s.id).expect("student").work_image.is_none());
    }

    #[test]
    fn evaluation_requires_image() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        let err = c.attach_evaluation(&s.id, evaluation(50.0)).unwrap_err();
        assert_eq!(err.code(), "no_image");
    }

    #[test]
    fn analyze_applies_result_and_uses_class_name() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.set_reference_text("The tortoise and the hare");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");

        let ticket = c.begin_analysis(&s.id).expect("ticket");
        assert_eq!(ticket.request.class_name, "5A");
        assert_eq!(ticket.request.reference_text, "The tortoise and the hare");
        assert!(c.session().loading());

        let outcome = c.finish_analysis(&ticket, Ok(evaluation(82.0))).expect("finish");
        assert!(matches!(outcome, AnalysisOutcome::Applied(_)));
        assert!(!c.session().loading());
        assert_eq!(c.session().active_student_id.as_deref(), Some(s.id.as_str()));
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");

        let first = c.begin_analysis(&s.id).expect("ticket");
        let second = c.begin_analysis(&s.id).expect("ticket");

        let late = c.finish_analysis(&first, Ok(evaluation(10.0))).expect("finish");
        assert_eq!(late, AnalysisOutcome::Stale);
        assert!(c.get_student(&s.id).expect("student").evaluation.is_none());

        c.finish_analysis(&second, Ok(evaluation(95.0))).expect("finish");
        let ev = c
            .get_student(&s.id)
            .expect("student")
            .evaluation
            .clone()
            .expect("evaluation");
        assert_eq!(ev.overall_score, 95.0);
    }

    #[test]
    fn failed_analysis_leaves_student_unchanged() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        let evaluator = CountingEvaluator {
            calls: Cell::new(0),
            fail: true,
        };
        let err = c.analyze(&s.id, &evaluator).unwrap_err();
        assert_eq!(err.code(), "evaluation_failed");
        assert_eq!(evaluator.calls.get(), 1);
        assert!(!c.session().loading());
        assert_eq!(
            c.get_student(&s.id).expect("student").status(),
            StudentStatus::ImagePending
        );
    }

    #[test]
    fn analyze_without_image_never_calls_evaluator() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        let evaluator = CountingEvaluator {
            calls: Cell::new(0),
            fail: false,
        };
        assert_eq!(c.analyze(&s.id, &evaluator).unwrap_err().code(), "no_image");
        assert_eq!(evaluator.calls.get(), 0);
    }

    #[test]
    fn export_then_import_round_trips() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(82.0)).expect("eval");
        c.archive_student(&s.id).expect("archive");
        c.set_reference_text("reference");

        let before = c.export_document();
        let text = serde_json::to_string(&before).expect("serialize");
        c.import_document(&text, true).expect("import");
        assert_eq!(c.snapshot(), &before);
    }

    #[test]
    fn import_is_tolerant_and_requires_confirmation() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        c.create_student(&class.id, "Ali").expect("student");

        let doc = r#"{"grades":[{"id":"g9","name":"6C"}],"referenceText":"ref"}"#;
        let err = c.import_document(doc, false).unwrap_err();
        assert_eq!(err.code(), "confirmation_required");
        assert_eq!(c.snapshot().students.len(), 1);

        c.import_document(doc, true).expect("import");
        assert!(c.snapshot().students.is_empty());
        assert!(c.snapshot().saved_reports.is_empty());
        assert_eq!(c.snapshot().grades[0].name, "6C");
        assert_eq!(c.snapshot().reference_text, "ref");
    }

    #[test]
    fn unparseable_import_changes_nothing() {
        let mut c = loaded();
        c.create_class("5A").expect("class");
        let err = c.import_document("{not json", true).unwrap_err();
        assert_eq!(err.code(), "import_parse_failed");
        assert_eq!(c.snapshot().grades.len(), 1);
    }

    #[test]
    fn save_is_suppressed_until_loaded() {
        let store = Store::open_in_memory().expect("store");
        let valid = serde_json::to_string(&Snapshot {
            reference_text: "keep me".into(),
            ..Snapshot::default()
        })
        .expect("serialize");
        store.put(APP_DATA_KEY, &valid).expect("seed");

        let mut c = Controller::new();
        c.create_class("early").expect("class");
        c.save();
        assert!(!c.is_loaded());

        c.attach_store(store);
        assert_eq!(c.snapshot().reference_text, "keep me");
        assert!(c.snapshot().grades.is_empty());
    }

    #[test]
    fn mutations_are_persisted_and_reloaded() {
        let dir = std::env::temp_dir().join(format!("graderd-state-{}", Uuid::new_v4()));
        {
            let mut c = Controller::new();
            c.attach_store(Store::open(&dir).expect("open"));
            let class = c.create_class("5A").expect("class");
            let ali = c.create_student(&class.id, "Ali").expect("student");
            c.toggle_comparison(&ali.id).expect("toggle");
            c.dismiss_onboarding();
        }
        let mut c = Controller::new();
        c.attach_store(Store::open(&dir).expect("reopen"));
        assert_eq!(c.snapshot().grades.len(), 1);
        assert_eq!(c.snapshot().students[0].name, "Ali");
        assert!(c.session().comparison.is_empty());
        assert!(!c.session().show_onboarding);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn malformed_snapshot_starts_empty() {
        let store = Store::open_in_memory().expect("store");
        store.put(APP_DATA_KEY, "[oops").expect("seed");
        let mut c = Controller::new();
        c.attach_store(store);
        assert!(c.is_loaded());
        assert_eq!(c.snapshot(), &Snapshot::default());
        assert!(c.session().show_onboarding);
    }

    fn break_store(c: &Controller) {
        c.store
            .as_ref()
            .expect("store")
            .conn()
            .execute("DROP TABLE kv_store", [])
            .expect("drop table");
    }

    fn stored_snapshot(c: &Controller) -> Snapshot {
        let text = c
            .store
            .as_ref()
            .expect("store")
            .get(APP_DATA_KEY)
            .expect("get")
            .expect("snapshot written");
        Snapshot::from_json_tolerant(&text).expect("parse")
    }

    #[test]
    fn failed_write_keeps_memory_and_next_save_catches_up() {
        let mut c = loaded();
        break_store(&c);

        let first = c.create_class("5A").expect("class");
        assert_eq!(c.snapshot().grades.len(), 1);
        assert_eq!(c.snapshot().grades[0].id, first.id);

        c.store
            .as_ref()
            .expect("store")
            .conn()
            .execute(
                "CREATE TABLE kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL, updated_at TEXT NOT NULL)",
                [],
            )
            .expect("recreate table");
        let second = c.create_class("5B").expect("class");

        let stored = stored_snapshot(&c);
        let ids: Vec<&str> = stored.grades.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[test]
    fn unreadable_store_loads_empty() {
        let mut c = loaded();
        c.create_class("5A").expect("class");
        c.dismiss_onboarding();
        break_store(&c);

        c.load();
        assert!(c.is_loaded());
        assert_eq!(c.snapshot(), &Snapshot::default());
        assert!(c.session().show_onboarding);
    }

    #[test]
    fn comparison_toggle_and_chart() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let a = c.create_student(&class.id, "Ali").expect("student");
        let b = c.create_student(&class.id, "Veli").expect("student");
        c.attach_image(&a.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&a.id, evaluation(82.0)).expect("eval");

        assert!(c.toggle_comparison(&a.id).expect("toggle"));
        assert!(c.toggle_comparison(&b.id).expect("toggle"));
        let chart = c.comparison_chart(Some(&class.id));
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "Ali");
        assert_eq!(chart.series[0].values[3], 95.0);

        assert!(!c.toggle_comparison(&a.id).expect("toggle"));
        assert!(c.comparison_chart(None).series.is_empty());
        assert!(c.toggle_comparison("missing").is_err());
    }

    #[test]
    fn delete_report_clears_viewed_report() {
        let mut c = loaded();
        let class = c.create_class("5A").expect("class");
        let s = c.create_student(&class.id, "Ali").expect("student");
        c.attach_image(&s.id, &png(10, 10), NormalizeOptions::default())
            .expect("image");
        c.attach_evaluation(&s.id, evaluation(82.0)).expect("eval");
        let report = c.archive_student(&s.id).expect("archive").expect("report");
        c.view_report(Some(&report.id)).expect("view");

        c.delete_report(&report.id).expect("delete");
        assert!(c.snapshot().saved_reports.is_empty());
        assert_eq!(c.session().viewing_report_id, None);
        assert_eq!(c.delete_report(&report.id).unwrap_err().code(), "not_found");
        assert!(c.get_student(&s.id).is_ok());
    }
}
