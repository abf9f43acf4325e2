//! Instruction payloads for résumé feedback.
//!
//! The instructions are sent as the user turn next to the rendered résumé
//! image; [`FEEDBACK_SYSTEM_PROMPT`] frames the model as a reviewer. The
//! expected reply shape lives in [`FEEDBACK_RESPONSE_FORMAT`] so the parser
//! in [`crate::pipeline::postprocess`] and the prompt agree on one schema.

/// System prompt for the feedback request.
pub const FEEDBACK_SYSTEM_PROMPT: &str = r#"You are a senior recruiter and an expert in Applicant Tracking Systems (ATS).
You review résumés from an image of their first page and give candid, specific, actionable feedback.
Reply with a single JSON object and nothing else."#;

/// Shape of the JSON object the model must return.
pub const FEEDBACK_RESPONSE_FORMAT: &str = r#"interface Feedback {
  overallScore: number; // 0-100
  ATS: {
    score: number; // how well the résumé passes automated screening
    tips: { type: "good" | "improve"; tip: string }[]; // 3-4 tips
  };
  toneAndStyle: {
    score: number;
    tips: { type: "good" | "improve"; tip: string; explanation: string }[];
  };
  content: {
    score: number;
    tips: { type: "good" | "improve"; tip: string; explanation: string }[];
  };
  structure: {
    score: number;
    tips: { type: "good" | "improve"; tip: string; explanation: string }[];
  };
  skills: {
    score: number;
    tips: { type: "good" | "improve"; tip: string; explanation: string }[];
  };
}"#;

/// Build the user-turn instructions for one résumé.
///
/// Blank job fields are passed through unchanged; the model is told to
/// judge against the title and description it is given.
pub fn prepare_instructions(job_title: &str, job_description: &str) -> String {
    format!(
        "Analyse and rate this résumé and suggest how to improve it.\n\
         Be thorough and detailed. Do not hesitate to point out mistakes or areas for improvement.\n\
         If there is a lot to improve, give low scores; scores are out of 100.\n\
         Take the job the candidate is applying for into account.\n\
         The job title is: {job_title}\n\
         The job description is: {job_description}\n\
         Return the feedback using this format:\n\
         {FEEDBACK_RESPONSE_FORMAT}\n\
         Return the analysis as a JSON object, without any other text and without backticks.\n\
         Do not include any comments."
    )
}
