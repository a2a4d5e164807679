use crate::ingest::IngestReport;
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_field(label: &str, value: &str) {
    println!("  {:<16} {}", format!("{}:", label).bold(), value);
}

pub fn print_report(report: &IngestReport) {
    print_header("Ingestion Report");
    print_field("chats", &report.chats.to_string());
    print_field("messages", &report.messages.to_string());
    print_field("skipped (empty)", &report.skipped.to_string());

    let failed = report.failed.to_string();
    let malformed = report.malformed.to_string();
    if report.failed + report.malformed > 0 {
        print_field("failed", &failed.red().to_string());
        print_field("malformed", &malformed.yellow().to_string());
        print_error(&format!(
            "{} of {} events were not stored",
            report.failed + report.malformed,
            report.total()
        ));
    } else {
        print_field("failed", &failed);
        print_field("malformed", &malformed);
        print_success("All events processed");
    }
}
