//! Genie Excel bridge: a Windows process that owns Excel via COM, controlled
//! by JSON commands over stdin/stdout.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostic messages go to stderr (never stdout)

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;

#[cfg(not(windows))]
fn main() {
    eprintln!("genie-excel-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run natively or under WINE.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead};

    use genie_protocol::*;

    eprintln!("[genie-excel-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut excel: Option<excel::ExcelApp> = None;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[genie-excel-bridge] stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                let response = handle_command(&mut excel, &request);
                let done = matches!(request.command, Command::Shutdown)
                    && matches!(response.result, ResponseResult::Ok { .. });
                if !write_response(&mut out, &response) || done {
                    break;
                }
                continue;
            }
            Err(e) => {
                eprintln!("[genie-excel-bridge] JSON parse error: {e}");
                // id 0: the request id could not be recovered
                Response {
                    id: 0,
                    result: ResponseResult::Error {
                        message: format!("JSON parse error: {e}"),
                    },
                }
            }
        };
        if !write_response(&mut out, &response) {
            break;
        }
    }

    if let Some(app) = excel {
        eprintln!("[genie-excel-bridge] stdin closed, shutting down Excel...");
        let _ = app.shutdown();
        uninit_com();
    }

    eprintln!("[genie-excel-bridge] Process exiting.");
}

#[cfg(windows)]
fn write_response(out: &mut impl std::io::Write, response: &genie_protocol::Response) -> bool {
    let json = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("[genie-excel-bridge] failed to encode response: {e}");
            return true;
        }
    };
    writeln!(out, "{json}").and_then(|_| out.flush()).is_ok()
}

#[cfg(windows)]
fn handle_command(
    excel: &mut Option<excel::ExcelApp>,
    request: &genie_protocol::Request,
) -> genie_protocol::Response {
    use genie_protocol::*;

    let id = request.id;

    let result = match &request.command {
        Command::Init => init_com_and_excel(excel),
        Command::CreateWorkbook => with_excel(excel, |app| {
            let opened = app.create_workbook()?;
            Ok(ResponseResult::ok(ResponseData::Opened { opened }))
        }),
        Command::OpenWorkbook { path } => with_excel(excel, |app| {
            let opened = app.open_workbook(path)?;
            Ok(ResponseResult::ok(ResponseData::Opened { opened }))
        }),
        Command::CloseWorkbook { save } => with_excel(excel, |app| {
            app.close_workbook(*save)?;
            Ok(ResponseResult::empty())
        }),
        Command::SetUserFacing { enabled } => with_excel(excel, |app| {
            app.set_user_facing(*enabled)?;
            Ok(ResponseResult::empty())
        }),
        Command::WorksheetNames => with_excel(excel, |app| {
            let names = app.worksheet_names()?;
            Ok(ResponseResult::ok(ResponseData::Names { names }))
        }),
        Command::ActivateWorksheet { name } => with_excel(excel, |app| {
            app.activate_worksheet(name)?;
            Ok(ResponseResult::empty())
        }),
        Command::ActiveWorksheet => with_excel(excel, |app| {
            let sheet = app.active_worksheet()?;
            Ok(ResponseResult::ok(ResponseData::Sheet { sheet }))
        }),
        Command::Selection => with_excel(excel, |app| {
            let address = app.selection_address()?;
            Ok(ResponseResult::ok(ResponseData::Address { address }))
        }),
        Command::ChartNames { sheet } => with_excel(excel, |app| {
            let names = app.chart_names(sheet)?;
            Ok(ResponseResult::ok(ResponseData::Names { names }))
        }),
        Command::VbaProjectAccessible => with_excel(excel, |app| {
            let flag = app.vba_project_accessible()?;
            Ok(ResponseResult::ok(ResponseData::Flag { flag }))
        }),
        Command::AddModule { name, code } => with_excel(excel, |app| {
            app.add_module(name, code)?;
            Ok(ResponseResult::empty())
        }),
        Command::RunMacro { name } => with_excel(excel, |app| {
            app.run_macro(name)?;
            Ok(ResponseResult::empty())
        }),
        Command::RemoveModule { name } => with_excel(excel, |app| {
            app.remove_module(name)?;
            Ok(ResponseResult::empty())
        }),
        Command::SaveWorkbook { path } => with_excel(excel, |app| {
            match path {
                Some(path) => app.save_as(path)?,
                None => app.save()?,
            }
            Ok(ResponseResult::empty())
        }),
        Command::SaveCopyAs { path } => with_excel(excel, |app| {
            app.save_copy_as(path)?;
            Ok(ResponseResult::empty())
        }),
        Command::WorkbookInfo => with_excel(excel, |app| {
            let workbook = app.workbook_info()?;
            Ok(ResponseResult::ok(ResponseData::Workbook { workbook }))
        }),
        Command::ApplicationInfo => with_excel(excel, |app| {
            let application = app.application_info()?;
            Ok(ResponseResult::ok(ResponseData::Application { application }))
        }),
        Command::WorksheetInfo { sheet } => with_excel(excel, |app| {
            let worksheet = app.worksheet_info(sheet)?;
            Ok(ResponseResult::ok(ResponseData::Worksheet { worksheet }))
        }),
        Command::WorksheetCells { sheet } => with_excel(excel, |app| {
            let areas = app.worksheet_cells(sheet)?;
            Ok(ResponseResult::ok(ResponseData::Cells { areas }))
        }),
        Command::WorksheetCharts { sheet } => with_excel(excel, |app| {
            let charts = app.worksheet_charts(sheet)?;
            Ok(ResponseResult::ok(ResponseData::Charts { charts }))
        }),
        Command::WorksheetText { sheet } => with_excel(excel, |app| {
            let text = app.worksheet_text(sheet)?;
            Ok(ResponseResult::ok(ResponseData::Text { text }))
        }),
        Command::Shutdown => match excel.take() {
            Some(app) => match app.shutdown() {
                Ok(()) => {
                    uninit_com();
                    ResponseResult::empty()
                }
                Err(e) => ResponseResult::Error {
                    message: format!("Shutdown failed: {e}"),
                },
            },
            None => ResponseResult::empty(),
        },
    };

    if let ResponseResult::Error { message } = &result {
        eprintln!("[genie-excel-bridge] request {id} failed: {message}");
    }

    Response { id, result }
}

#[cfg(windows)]
fn init_com_and_excel(excel: &mut Option<excel::ExcelApp>) -> genie_protocol::ResponseResult {
    use genie_protocol::ResponseResult;
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if excel.is_some() {
        return ResponseResult::empty();
    }

    // Excel requires a single-threaded apartment
    unsafe {
        let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
        if let Err(e) = hr.ok() {
            return ResponseResult::Error {
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }

    eprintln!("[genie-excel-bridge] COM initialized (STA)");

    match excel::ExcelApp::new() {
        Ok(app) => {
            eprintln!("[genie-excel-bridge] Excel.Application created");
            *excel = Some(app);
            ResponseResult::empty()
        }
        Err(e) => {
            uninit_com();
            ResponseResult::Error {
                message: format!("Failed to create Excel.Application: {e}"),
            }
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    eprintln!("[genie-excel-bridge] COM uninitialized");
}

#[cfg(windows)]
fn with_excel(
    excel: &mut Option<excel::ExcelApp>,
    f: impl FnOnce(&mut excel::ExcelApp) -> Result<genie_protocol::ResponseResult, String>,
) -> genie_protocol::ResponseResult {
    match excel.as_mut() {
        Some(app) => match f(app) {
            Ok(r) => r,
            Err(e) => genie_protocol::ResponseResult::Error { message: e },
        },
        None => genie_protocol::ResponseResult::Error {
            message: "Excel not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
