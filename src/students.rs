use crate::error::ClientError;
use crate::types::{Student, StudentForm};

const QR_PREFIX: &str = "STUDENT-";

/// QR payload printed on a student's card: `STUDENT-<nis>`.
pub fn qr_payload_for_nis(nis: &str) -> String {
    format!("{QR_PREFIX}{}", nis.trim())
}

impl StudentForm {
    /// New form with the QR payload derived from the NIS.
    pub fn new(name: &str, nis: &str, class: &str, phone: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            nis: nis.trim().to_string(),
            class: class.trim().to_string(),
            phone: phone.trim().to_string(),
            qr_code: qr_payload_for_nis(nis),
        }
    }

    /// Change the NIS and re-derive the QR payload with it.
    pub fn set_nis(&mut self, nis: &str) {
        self.nis = nis.trim().to_string();
        self.qr_code = qr_payload_for_nis(nis);
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.name.trim().is_empty() {
            return Err(ClientError::Invalid("student name is required".into()));
        }
        if self.nis.trim().is_empty() {
            return Err(ClientError::Invalid("student NIS is required".into()));
        }
        Ok(())
    }
}

impl From<&Student> for StudentForm {
    /// Edit form for an existing student; keeps its current QR payload.
    fn from(s: &Student) -> Self {
        Self {
            name: s.name.clone(),
            nis: s.nis.clone(),
            class: s.class.clone(),
            phone: s.phone.clone(),
            qr_code: s.qr_code.clone(),
        }
    }
}

/// Name search plus optional class restriction (`None` = all classes).
#[derive(Debug, Clone, Default)]
pub struct StudentQuery {
    pub search: String,
    pub class: Option<String>,
}

impl StudentQuery {
    pub fn matches(&self, student: &Student) -> bool {
        let needle = self.search.trim().to_lowercase();
        let name_ok = needle.is_empty() || student.name.to_lowercase().contains(&needle);
        let class_ok = self
            .class
            .as_deref()
            .map_or(true, |c| student.class == c);
        name_ok && class_ok
    }
}

/// Students matching `query`, in their original order.
pub fn filter_students<'a>(students: &'a [Student], query: &StudentQuery) -> Vec<&'a Student> {
    students.iter().filter(|s| query.matches(s)).collect()
}

/// Class names in first-seen order, without blanks or repeats.
pub fn distinct_classes(students: &[Student]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for s in students {
        if !s.class.is_empty() && seen.insert(s.class.as_str()) {
            out.push(s.class.clone());
        }
    }
    out
}

/// File name used when a student's QR image is saved.
pub fn qr_download_name(student: &Student) -> String {
    format!("qr-{}.png", student.name)
}

/// Students that actually have a QR payload, paired with their download name.
pub fn qr_targets<'a>(students: &[&'a Student]) -> Vec<(&'a Student, String)> {
    students
        .iter()
        .filter(|s| !s.qr_code.is_empty())
        .map(|s| (*s, qr_download_name(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: u64, name: &str, class: &str, qr: &str) -> Student {
        Student {
            id,
            name: name.into(),
            nis: id.to_string(),
            class: class.into(),
            phone: String::new(),
            qr_code: qr.into(),
        }
    }

    fn roster() -> Vec<Student> {
        vec![
            student(1, "Budi Santoso", "10A", "STUDENT-1"),
            student(2, "Ana", "9B", "STUDENT-2"),
            student(3, "Bunga", "10A", ""),
            student(4, "Dewi", "", "STUDENT-4"),
        ]
    }

    #[test]
    fn qr_payload_is_prefixed_nis() {
        assert_eq!(qr_payload_for_nis(" 12345 "), "STUDENT-12345");
        let form = StudentForm::new("Ana", "777", "9B", "0812");
        assert_eq!(form.qr_code, "STUDENT-777");
    }

    #[test]
    fn changing_nis_rederives_qr_but_edit_form_keeps_existing() {
        let existing = student(5, "Eko", "11C", "LEGACY-CODE");
        let mut form = StudentForm::from(&existing);
        assert_eq!(form.qr_code, "LEGACY-CODE");
        form.set_nis("500");
        assert_eq!(form.nis, "500");
        assert_eq!(form.qr_code, "STUDENT-500");
    }

    #[test]
    fn validation_requires_name_and_nis() {
        assert!(StudentForm::new("", "1", "", "").validate().is_err());
        assert!(StudentForm::new("Ana", " ", "", "").validate().is_err());
        assert!(StudentForm::new("Ana", "1", "", "").validate().is_ok());
    }

    #[test]
    fn search_is_case_insensitive_and_class_optional() {
        let all = roster();
        let q = StudentQuery {
            search: "bu".into(),
            class: None,
        };
        let names: Vec<_> = filter_students(&all, &q).into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Budi Santoso", "Bunga"]);

        let q = StudentQuery {
            search: String::new(),
            class: Some("9B".into()),
        };
        let names: Vec<_> = filter_students(&all, &q).into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ana"]);
    }

    #[test]
    fn classes_in_first_seen_order() {
        assert_eq!(distinct_classes(&roster()), vec!["10A".to_string(), "9B".to_string()]);
    }

    #[test]
    fn qr_targets_skip_students_without_code() {
        let all = roster();
        let refs: Vec<&Student> = all.iter().collect();
        let targets = qr_targets(&refs);
        let files: Vec<_> = targets.iter().map(|(_, f)| f.as_str()).collect();
        assert_eq!(files, vec!["qr-Budi Santoso.png", "qr-Ana.png", "qr-Dewi.png"]);
    }
}
