use super::types::TestResults;
use crate::runner::state::{TestOutcome, TestRecordReport};
use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use std::path::Path;

/// Generate JUnit XML report string from TestResults
pub fn generate_junit_xml(results: &TestResults) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let summary = &results.summary;
    let total_duration: u64 = results
        .tests
        .iter()
        .map(|t| t.duration_ms.unwrap_or(0))
        .sum();
    let time = (total_duration as f64 / 1000.0).to_string();

    let counts = [
        ("tests", summary.total.to_string()),
        ("failures", summary.failed.to_string()),
        ("errors", summary.errored.to_string()),
        ("skipped", summary.skipped.to_string()),
    ];

    // <testsuites>
    let mut suites_start = BytesStart::new("testsuites");
    suites_start.push_attribute(("name", "lumi-harness-run"));
    for (key, value) in &counts {
        suites_start.push_attribute((*key, value.as_str()));
    }
    suites_start.push_attribute(("time", time.as_str()));
    writer.write_event(Event::Start(suites_start))?;

    // One <testsuite> per environment run
    let mut suite_start = BytesStart::new("testsuite");
    suite_start.push_attribute(("name", results.env.as_str()));
    for (key, value) in &counts {
        suite_start.push_attribute((*key, value.as_str()));
    }
    suite_start.push_attribute(("id", results.session_id.as_str()));
    suite_start.push_attribute(("time", time.as_str()));
    suite_start.push_attribute(("timestamp", results.generated_at.as_str()));
    writer.write_event(Event::Start(suite_start))?;

    for test in &results.tests {
        write_test_case(&mut writer, test, &results.env)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    let xml = String::from_utf8(result)?;
    Ok(xml)
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    test: &TestRecordReport,
    env: &str,
) -> Result<()> {
    let mut case_start = BytesStart::new("testcase");
    let classname = format!("lumi_harness.{}", env);

    case_start.push_attribute(("name", test.name.as_str()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute((
        "time",
        (test.duration_ms.unwrap_or(0) as f64 / 1000.0)
            .to_string()
            .as_str(),
    ));

    writer.write_event(Event::Start(case_start))?;

    let element = match &test.outcome {
        TestOutcome::Passed => None,
        TestOutcome::Failed { message } => Some(("failure", "AssertionError", message)),
        TestOutcome::Errored { message } => Some(("error", "Error", message)),
        TestOutcome::Skipped { reason } => Some(("skipped", "", reason)),
    };

    if let Some((tag, kind, message)) = element {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("message", message.as_str()));
        if !kind.is_empty() {
            start.push_attribute(("type", kind));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(message)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        } else {
            writer.write_event(Event::Empty(start))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// Write report to file
pub fn write_report(results: &TestResults, output_dir: &Path) -> Result<()> {
    let xml = generate_junit_xml(results)?;
    let path = output_dir.join("junit.xml");
    std::fs::write(&path, xml)?;
    log::info!("Generated JUnit report: {}", path.display());
    Ok(())
}
