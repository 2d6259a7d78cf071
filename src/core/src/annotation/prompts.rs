//! Prompt builders for the generative-AI service.

use super::types::{AnnotationRequest, Language};

/// Asks the model to close its answer with dashboard counters.
pub const STATS_INSTRUCTION: &str = "At the very end of your response, append a JSON block \
inside ```json``` code fences with two objects mapping category names to counts: \
\"attack_vectors\" (e.g. DDoS, SQL Injection, Brute Force, Malware, Phishing) and \
\"traffic_stats\" (e.g. HTTP/HTTPS, DNS, TCP, UDP, ICMP).";

fn output_in(language: Language) -> String {
    format!("Output in {}.", language.display_name())
}

pub fn threat_prompt(request: &AnnotationRequest) -> String {
    format!(
        "Analyze this specific log entry: \"{}\". Context: {}. {}",
        request.summary,
        request.context,
        output_in(request.language)
    )
}

pub fn traffic_batch_prompt(traffic: &str, language: Language) -> String {
    format!(
        "Analyze traffic: {}. {}\n{}",
        traffic,
        output_in(language),
        STATS_INSTRUCTION
    )
}

pub fn security_report_prompt(infrastructure: &str, language: Language) -> String {
    format!(
        "Generate vulnerability report for: {}. {}",
        infrastructure,
        output_in(language)
    )
}

pub fn log_file_prompt(contents: &str, language: Language) -> String {
    format!("Analyze log: {}. {}", contents, output_in(language))
}
