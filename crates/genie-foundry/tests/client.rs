mod common;

use std::time::Duration;

use common::{config, created, default_response, transport_error, valid, FakeTransport};
use genie_foundry::{
    CancellationToken, FoundryClient, FoundryError, HttpResponse, UserPrompt,
};
use genie_protocol::{CellArea, CellSnapshot, ChartSnapshot, WorkbookInfo, WorksheetSnapshot};
use pretty_assertions::assert_eq;

fn text_cell(row: u32, column: u32) -> CellSnapshot {
    CellSnapshot {
        address: format!("R{row}C{column}"),
        row,
        column,
        text: format!("{row}:{column}"),
        ..Default::default()
    }
}

fn area(first_row: u32, rows: u32, columns: u32) -> CellArea {
    let mut cells = Vec::new();
    for row in first_row..first_row + rows {
        for column in 1..=columns {
            cells.push(text_cell(row, column));
        }
    }
    CellArea {
        first_row,
        first_column: 1,
        rows,
        columns,
        cells,
    }
}

#[tokio::test]
async fn test_prompt_key_flows_into_agent_plan() {
    let transport = FakeTransport::new(|req, _| {
        if req.url.contains("create-user-prompt") {
            return Ok(created("prompt-pk-9"));
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());

    let key = client
        .create_user_prompt(&UserPrompt {
            custom_instructions: Some("Be brief"),
            selected_worksheet: Some("Sheet1"),
            ..UserPrompt::new("Sum column B")
        })
        .await
        .unwrap();
    assert_eq!(key, "prompt-pk-9");
    assert_eq!(client.latest_prompt_key(), Some("prompt-pk-9"));

    let plan = client
        .get_agent_plan("wb-pk", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(plan, "1. Sum the column");

    let transport = client.transport();
    let prompt = &transport.requests_to("create-user-prompt")[0];
    assert_eq!(prompt.params()["prompt_text"], "Sum column B");
    assert_eq!(prompt.params()["user_custom_instructions"], "Be brief");
    assert_eq!(
        prompt.body.as_ref().unwrap()["options"]["mode"],
        "VALIDATE_AND_EXECUTE"
    );

    let plan_request = &transport.requests_to("get-agent-plan")[0];
    assert_eq!(plan_request.params()["userPrompt"], "prompt-pk-9");
    assert_eq!(plan_request.params()["excelWorkbook"], "wb-pk");

    let steps_request = &transport.requests_to("genieForExcelPlanSteps")[0];
    assert_eq!(steps_request.params()["userPrompt"], "prompt-pk-9");
}

#[tokio::test]
async fn test_prompt_key_falls_back_to_guid_when_valid() {
    let transport = FakeTransport::new(|_, _| Ok(valid()));
    let mut client = FoundryClient::new(transport, config());

    let key = client.create_user_prompt(&UserPrompt::new("hi")).await.unwrap();
    let sent = &client.transport().requests()[0];
    assert_eq!(sent.params()["prompt_guid"], key.as_str());
}

#[tokio::test]
async fn test_prompt_without_key_fails() {
    let transport = FakeTransport::new(|_, _| {
        Ok(HttpResponse::new(200, r#"{"validation":{"result":"INVALID"}}"#))
    });
    let mut client = FoundryClient::new(transport, config());

    let err = client.create_user_prompt(&UserPrompt::new("hi")).await.unwrap_err();
    assert!(matches!(err, FoundryError::MissingPrimaryKey { .. }));
    assert_eq!(client.latest_prompt_key(), None);
}

#[tokio::test]
async fn test_agent_plan_requires_prompt() {
    let client = FoundryClient::new(FakeTransport::ok(), config());
    let err = client
        .get_agent_plan("wb", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::InvalidArgument(_)));
    assert!(client.transport().requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_agent_plan_polls_until_present() {
    let transport = FakeTransport::new(|req, index| {
        if req.url.contains("/objects/ExcelWorkbook/") {
            return match index {
                0 => Err(transport_error()),
                1 => Ok(HttpResponse::new(200, r#"{"agentPlan":""}"#)),
                _ => Ok(HttpResponse::new(200, r#"{"agentPlan":"Plan B"}"#)),
            };
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());
    client.set_latest_prompt_key("p");

    let plan = client
        .get_agent_plan("wb", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(plan, "Plan B");
    assert_eq!(client.transport().requests_to("/objects/ExcelWorkbook/wb").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_agent_plan_times_out() {
    let transport = FakeTransport::new(|req, _| {
        if req.url.contains("/objects/") {
            return Ok(HttpResponse::new(200, r#"{"agentPlan":null}"#));
        }
        Ok(default_response(req))
    });
    let mut cfg = config();
    cfg.agent_plan_timeout = Duration::from_secs(30);
    let mut client = FoundryClient::new(transport, cfg);
    client.set_latest_prompt_key("p");

    let err = client
        .get_agent_plan("wb", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::Timeout(_)));
    // polls at 0, 5, ..., 25 seconds
    assert_eq!(client.transport().requests_to("/objects/").len(), 6);
    assert!(client.transport().requests_to("genieForExcelPlanSteps").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_agent_plan_cancelled_while_polling() {
    let transport = FakeTransport::new(|req, _| {
        if req.url.contains("/objects/") {
            return Ok(HttpResponse::new(200, "{}"));
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());
    client.set_latest_prompt_key("p");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        trigger.cancel();
    });

    let err = client.get_agent_plan("wb", &cancel).await.unwrap_err();
    assert!(matches!(err, FoundryError::Cancelled));
    assert_eq!(client.transport().requests_to("/objects/").len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_plan_steps_retry_on_query_timeout() {
    let transport = FakeTransport::new(|_, index| {
        Ok(match index {
            0 => HttpResponse::new(500, r#"{"errorCode":"TIMEOUT","errorName":"QueryTimeExceededLimit"}"#),
            1 => HttpResponse::new(400, r#"{"errorName":"QueryTimeExceededLimit"}"#),
            _ => HttpResponse::new(200, r#"{"value":[{"stepIndex":1}]}"#),
        })
    });
    let client = FoundryClient::new(transport, config());

    let body = client
        .get_plan_steps("wb", "p", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(body, r#"{"value":[{"stepIndex":1}]}"#);
    assert_eq!(client.transport().requests().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_plan_steps_abort_on_other_status() {
    let transport = FakeTransport::new(|_, _| {
        Ok(HttpResponse::new(403, r#"{"errorCode":"PERMISSION_DENIED"}"#))
    });
    let client = FoundryClient::new(transport, config());

    let err = client
        .get_plan_steps("wb", "p", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::Status { status: 403, .. }));
    assert_eq!(client.transport().requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_plan_steps_give_up_after_max_attempts() {
    let transport = FakeTransport::new(|_, index| {
        if index % 2 == 0 {
            Err(transport_error())
        } else {
            Ok(HttpResponse::new(500, "TIMEOUT"))
        }
    });
    let mut cfg = config();
    cfg.plan_steps_max_attempts = 4;
    let client = FoundryClient::new(transport, cfg);

    let err = client
        .get_plan_steps("wb", "p", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::Timeout(_)));
    assert_eq!(client.transport().requests().len(), 4);
}

#[tokio::test]
async fn test_cells_sent_in_batches_row_major() {
    let client_transport = FakeTransport::ok();
    let mut client = FoundryClient::new(client_transport, config());

    // 5 x 5 and 4 x 5 areas: 45 cells, plus blanks that must be skipped
    let mut first = area(1, 5, 5);
    first.cells.insert(3, CellSnapshot::default());
    let second = area(10, 4, 5);

    let stats = client
        .process_worksheet_cells(&[first, second], "ws-pk", None)
        .await
        .unwrap();
    assert_eq!(stats.processed, 45);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.batches, 3);

    let batches = client.transport().requests_to("create-excel-cell/applyBatch");
    let sizes: Vec<usize> = batches
        .iter()
        .map(|b| b.body.as_ref().unwrap()["requests"].as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![20, 20, 5]);

    let order: Vec<String> = batches
        .iter()
        .flat_map(|b| {
            b.body.as_ref().unwrap()["requests"]
                .as_array()
                .unwrap()
                .iter()
                .map(|r| r["parameters"]["cell_address"].as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    let expected: Vec<String> = (1..=5)
        .chain(10..=13)
        .flat_map(|row| (1..=5).map(move |col| format!("R{row}C{col}")))
        .collect();
    assert_eq!(order, expected);

    assert_eq!(
        batches[0].body.as_ref().unwrap()["options"]["returnEdits"],
        "NONE"
    );
    assert_eq!(
        batches[0].body.as_ref().unwrap()["requests"][0]["parameters"]["worksheet_guidref"],
        "ws-pk"
    );
}

#[tokio::test]
async fn test_first_cell_validated_once_per_client() {
    let mut client = FoundryClient::new(FakeTransport::ok(), config());

    client
        .process_worksheet_cells(&[area(1, 1, 3)], "ws-1", None)
        .await
        .unwrap();
    client
        .process_worksheet_cells(&[area(1, 2, 2)], "ws-2", None)
        .await
        .unwrap();

    let validations = client.transport().requests_to("create-excel-cell/apply");
    let validations: Vec<_> = validations
        .iter()
        .filter(|r| !r.url.ends_with("applyBatch"))
        .collect();
    assert_eq!(validations.len(), 1);
    let body = validations[0].body.as_ref().unwrap();
    assert_eq!(body["options"]["mode"], "VALIDATE_ONLY");
    assert_eq!(body["parameters"]["cell_address"], "R1C1");
}

fn batch_addresses(batch: &common::Recorded) -> Vec<String> {
    batch.body.as_ref().unwrap()["requests"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["parameters"]["cell_address"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_cell_failing_validation_is_dropped_and_next_validated() {
    let transport = FakeTransport::new(|req, index| {
        if req.url.ends_with("create-excel-cell/apply") && index == 0 {
            return Ok(HttpResponse::new(400, r#"{"errorCode":"INVALID_ARGUMENT"}"#));
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());

    let stats = client
        .process_worksheet_cells(&[area(1, 2, 2)], "ws", None)
        .await
        .unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.dropped, 1);

    let validations: Vec<_> = client
        .transport()
        .requests_to("create-excel-cell/apply")
        .into_iter()
        .filter(|r| !r.url.ends_with("applyBatch"))
        .collect();
    assert_eq!(validations.len(), 2);
    assert_eq!(validations[1].params()["cell_address"], "R1C2");

    let batches = client.transport().requests_to("applyBatch");
    assert_eq!(batches.len(), 1);
    assert_eq!(batch_addresses(&batches[0]), vec!["R1C2", "R2C1", "R2C2"]);
}

#[tokio::test]
async fn test_every_cell_failing_validation_sends_no_batches() {
    let transport = FakeTransport::new(|req, _| {
        if req.url.ends_with("create-excel-cell/apply") {
            return Ok(HttpResponse::new(400, r#"{"errorCode":"INVALID_ARGUMENT"}"#));
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());

    let stats = client
        .process_worksheet_cells(&[area(1, 2, 2)], "ws", None)
        .await
        .unwrap();
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.dropped, 4);
    assert!(client.transport().requests_to("applyBatch").is_empty());
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_remaining_cells() {
    let transport = FakeTransport::new(|req, index| {
        if req.url.ends_with("applyBatch") && index == 1 {
            return Ok(HttpResponse::new(500, "boom"));
        }
        Ok(default_response(req))
    });
    let mut cfg = config();
    cfg.cell_batch_size = 4;
    let mut client = FoundryClient::new(transport, cfg);

    let stats = client
        .process_worksheet_cells(&[area(1, 3, 4)], "ws", None)
        .await
        .unwrap();
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.dropped, 4);

    let batches = client.transport().requests_to("applyBatch");
    assert_eq!(batches.len(), 3);
    assert_eq!(
        batch_addresses(&batches[2]),
        vec!["R3C1", "R3C2", "R3C3", "R3C4"]
    );
}

#[tokio::test]
async fn test_failed_final_batch_is_resent_once_then_fails() {
    let transport = FakeTransport::new(|req, index| {
        if req.url.ends_with("applyBatch") && index == 2 {
            return Ok(HttpResponse::new(500, "boom"));
        }
        Ok(default_response(req))
    });
    let mut cfg = config();
    cfg.cell_batch_size = 4;
    let mut client = FoundryClient::new(transport, cfg);

    let err = client
        .process_worksheet_cells(&[area(1, 2, 5)], "ws", None)
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::Status { status: 500, .. }));

    let batches = client.transport().requests_to("applyBatch");
    // two full batches, then the two-cell final batch sent twice
    assert_eq!(batches.len(), 4);
    assert_eq!(batch_addresses(&batches[2]), vec!["R2C4", "R2C5"]);
    assert_eq!(batches[2].body, batches[3].body);
}

#[tokio::test]
async fn test_workbook_and_worksheet_require_primary_key() {
    let transport = FakeTransport::new(|req, _| {
        if req.url.contains("create-excel-worksheet") {
            return Ok(HttpResponse::new(200, r#"{"edits":{"edits":[{"objectRid":"ri.1"}]}}"#));
        }
        Ok(created("wb-pk"))
    });
    let client = FoundryClient::new(transport, config());

    let info = WorkbookInfo {
        name: "Book.xlsx".into(),
        ..Default::default()
    };
    let workbook = client
        .create_excel_workbook(&info, "/tmp/Book.xlsx", 10)
        .await
        .unwrap();
    assert_eq!(workbook.primary_key, "wb-pk");
    let sent = &client.transport().requests()[0];
    assert_eq!(sent.params()["workbook_guid"], workbook.local_guid.as_str());

    let err = client
        .create_excel_worksheet(&WorksheetSnapshot::default(), "wb-pk")
        .await
        .unwrap_err();
    assert!(matches!(err, FoundryError::MissingPrimaryKey { .. }));
}

#[tokio::test]
async fn test_charts_validate_once_and_skip_failures() {
    let transport = FakeTransport::new(|req, _| {
        let name = req
            .body
            .as_ref()
            .and_then(|b| b["parameters"]["chart_name"].as_str().map(str::to_string));
        if name.as_deref() == Some("Broken") {
            return Ok(HttpResponse::new(500, "chart failed"));
        }
        Ok(default_response(req))
    });
    let mut client = FoundryClient::new(transport, config());

    let charts = ["Chart 1", "Broken", "Chart 3"].map(|name| ChartSnapshot {
        name: name.into(),
        chart_type: 51,
        ..Default::default()
    });
    let created = client.process_worksheet_charts(&charts, "ws").await;
    assert_eq!(created, 2);

    let requests = client.transport().requests_to("create-excel-chart/apply");
    let validations = requests
        .iter()
        .filter(|r| r.body.as_ref().unwrap()["options"]["mode"] == "VALIDATE_ONLY")
        .count();
    assert_eq!(validations, 1);
    assert!(requests[0].url.contains("/v2/ontologies/ont/"));
}

#[tokio::test]
async fn test_summary_requires_valid_result() {
    let transport = FakeTransport::new(|_, index| {
        Ok(match index {
            0 => HttpResponse::new(200, r#"{"validation":{"result":"INVALID"}}"#),
            _ => valid(),
        })
    });
    let client = FoundryClient::new(transport, config());

    let err = client.generate_workbook_summary("wb").await.unwrap_err();
    assert!(matches!(err, FoundryError::ValidationFailed { .. }));
    client.generate_workbook_summary("wb").await.unwrap();

    let err = client.generate_workbook_summary("").await.unwrap_err();
    assert!(matches!(err, FoundryError::InvalidArgument(_)));
    assert_eq!(client.transport().requests().len(), 2);
}

#[tokio::test]
async fn test_check_connection() {
    let up = FoundryClient::new(FakeTransport::ok(), config());
    assert!(up.check_connection().await);
    assert_eq!(
        up.transport().requests()[0].url,
        "https://foundry.test/api/v2/ontologies/ont"
    );

    let down = FoundryClient::new(FakeTransport::new(|_, _| Err(transport_error())), config());
    assert!(!down.check_connection().await);
}
