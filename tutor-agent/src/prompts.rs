//! Tutoring system prompts.

use serde::{Deserialize, Serialize};

const GENERAL_TUTOR: &str = "\
You are TutorUG, an AI tutor for Ugandan O-Level students preparing for UNEB examinations.

CORE PRINCIPLES:
1. Use Ugandan context and examples (Kampala, boda bodas, local markets, school fees)
2. Explain concepts step-by-step with patience
3. Adapt to the student's pace and class level
4. Use simple, clear English
5. Follow the UNEB syllabus and examination technique
6. Encourage critical thinking; never discourage

RESPONSE FORMAT:
- Acknowledge the question
- Explain with a local example
- Give step-by-step working when needed
- Ask a question to check understanding
- End with encouragement

Students often use basic phones with limited data, so keep answers concise.";

const HOMEWORK_HELP: &str = "\
You are TutorUG's homework assistant. Guide the student to the answer instead of giving it:
explain why each step works, point out common mistakes, suggest a similar practice problem,
and ask questions that lead to understanding.";

const EXAM_PREP: &str = "\
You are TutorUG's examination coach. Review key concepts and formulas, practise past-paper
style questions, teach time management and common exam pitfalls, and build confidence.
Focus on topics that appear often in UNEB papers.";

const PROJECT_GUIDE: &str = "\
You are TutorUG's project guide. Always wait for the student's own idea before suggesting
anything. Help them improve it, keep it original, keep it feasible with local resources,
and aim it at a real problem in their Ugandan community. Give practical implementation steps.";

/// What kind of help a chat session is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Learning,
    Homework,
    ExamPrep,
    Project,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectContext {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContext {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: Option<String>,
    pub class_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentContext {
    pub first_name: String,
    pub current_class: Option<String>,
    pub region: Option<String>,
}

/// Everything known about the conversation's setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorContext {
    pub subject: Option<SubjectContext>,
    pub topic: Option<TopicContext>,
    pub student: Option<StudentContext>,
}

/// Assemble the system prompt for a session.
pub fn system_prompt(kind: SessionKind, context: &TutorContext) -> String {
    let mut prompt = String::from(GENERAL_TUTOR);

    match kind {
        SessionKind::Learning => {}
        SessionKind::Homework => push_section(&mut prompt, HOMEWORK_HELP),
        SessionKind::ExamPrep => push_section(&mut prompt, EXAM_PREP),
        SessionKind::Project => push_section(&mut prompt, PROJECT_GUIDE),
    }

    if let Some(subject) = &context.subject {
        push_section(
            &mut prompt,
            &format!("SUBJECT CONTEXT: {} - {}", subject.name, subject.description),
        );
    }

    if let Some(topic) = &context.topic {
        let mut section = format!("TOPIC CONTEXT: {} - {}", topic.title, topic.description);
        if let Some(difficulty) = &topic.difficulty {
            section.push_str(&format!("\nDifficulty Level: {difficulty}"));
        }
        if let Some(class_level) = &topic.class_level {
            section.push_str(&format!("\nClass Level: {class_level}"));
        }
        push_section(&mut prompt, &section);
    }

    if let Some(student) = &context.student {
        let mut section = format!("STUDENT CONTEXT:\nName: {}", student.first_name);
        if let Some(class) = &student.current_class {
            section.push_str(&format!("\nClass: {class}"));
        }
        section.push_str(&format!(
            "\nRegion: {}",
            student.region.as_deref().unwrap_or("Uganda")
        ));
        push_section(&mut prompt, &section);
    }

    prompt
}

fn push_section(prompt: &mut String, section: &str) {
    prompt.push_str("\n\n");
    prompt.push_str(section);
}

/// Default session title.
pub fn default_title(kind: SessionKind, context: &TutorContext) -> String {
    match (&context.topic, &context.subject) {
        (Some(topic), _) => format!("{} - AI Tutor Session", topic.title),
        (None, Some(subject)) => format!("{} - AI Tutor Session", subject.name),
        (None, None) => match kind {
            SessionKind::Learning => "AI Tutor Session".to_string(),
            SessionKind::Homework => "Homework Help".to_string(),
            SessionKind::ExamPrep => "Exam Preparation".to_string(),
            SessionKind::Project => "Project Guidance".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_context() {
        let context = TutorContext {
            subject: Some(SubjectContext {
                name: "Physics".into(),
                description: "Matter and energy".into(),
            }),
            topic: Some(TopicContext {
                title: "Electricity".into(),
                description: "Current and circuits".into(),
                difficulty: Some("intermediate".into()),
                class_level: Some("S3".into()),
            }),
            student: Some(StudentContext {
                first_name: "Nakato".into(),
                current_class: Some("S3".into()),
                region: None,
            }),
        };

        let prompt = system_prompt(SessionKind::ExamPrep, &context);
        assert!(prompt.starts_with("You are TutorUG"));
        assert!(prompt.contains("examination coach"));
        assert!(prompt.contains("SUBJECT CONTEXT: Physics"));
        assert!(prompt.contains("Class Level: S3"));
        assert!(prompt.contains("Region: Uganda"));
    }

    #[test]
    fn test_default_title() {
        assert_eq!(
            default_title(SessionKind::Homework, &TutorContext::default()),
            "Homework Help"
        );
        let context = TutorContext {
            topic: Some(TopicContext {
                title: "Quadratics".into(),
                ..TopicContext::default()
            }),
            ..TutorContext::default()
        };
        assert_eq!(
            default_title(SessionKind::Learning, &context),
            "Quadratics - AI Tutor Session"
        );
    }
}
