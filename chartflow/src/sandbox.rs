//! Sandboxed execution of model-generated Lua.
//!
//! # Architecture Notes
//!
//! The generated code never sees the caller's [`Dataset`]: rows are
//! serialized into fresh Lua tables, so any mutation stays inside the Lua
//! state, which is created per execution and dropped with it. The
//! capability surface is enumerable: the trimmed Lua stdlib, a capturing
//! `print`, the `data`/`columns` globals and the `tbl`/`chart` helper
//! libraries from the prelude. No filesystem, network, process or client
//! access exists inside the state.
//!
//! Runaway code is stopped two ways from inside an instruction-count hook:
//! an instruction budget and a wall-clock deadline. Both surface as
//! [`ExecutionResult::Failure`], never as a hang or a crash.

use mlua::{HookTriggers, Lua, LuaSerdeExt, MultiValue, Value as LuaValue, VmState};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dataset::Dataset;
use crate::figure::FigureSpec;
use crate::pipeline::types::{
    ExecutionResult, PlotRow, BINDING_CHART_TYPE, BINDING_FIG, BINDING_PLOT_DATA,
};

/// Maximum number of Lua instructions per execution.
pub const INSTRUCTION_LIMIT: i64 = 50_000_000;

/// How often to check the budget and the deadline (every N instructions).
pub const INSTRUCTION_HOOK_INTERVAL: u32 = 10_000;

/// Cap on captured print() lines.
pub const MAX_OUTPUT_LINES: usize = 100;

/// Longest error message kept in a failure.
const MAX_ERROR_LEN: usize = 600;

/// How many traceback lines survive into the stack summary.
const MAX_STACK_LINES: usize = 4;

#[derive(Debug, Clone)]
pub struct SandboxOptions {
    pub timeout: Duration,
    pub instruction_limit: i64,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            instruction_limit: INSTRUCTION_LIMIT,
        }
    }
}

impl SandboxOptions {
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(secs),
            ..Self::default()
        }
    }
}

/// Aggregation and figure helpers preloaded into the namespace. Pure Lua,
/// standing in for the pandas/plotting surface the generated code expects.
const PRELUDE: &str = r#"
tbl = {}

function tbl.count_by(rows, col)
  local counts, order = {}, {}
  for _, row in ipairs(rows) do
    local key = row[col]
    if key ~= nil then
      key = tostring(key)
      if counts[key] == nil then counts[key] = 0; order[#order + 1] = key end
      counts[key] = counts[key] + 1
    end
  end
  local out = {}
  for _, key in ipairs(order) do out[#out + 1] = { [col] = key, count = counts[key] } end
  table.sort(out, function(a, b) return a.count > b.count end)
  return out
end

function tbl.sum_by(rows, col, value_col)
  local sums, order = {}, {}
  for _, row in ipairs(rows) do
    local key = row[col]
    local value = tonumber(row[value_col])
    if key ~= nil and value ~= nil then
      key = tostring(key)
      if sums[key] == nil then sums[key] = 0; order[#order + 1] = key end
      sums[key] = sums[key] + value
    end
  end
  local out = {}
  for _, key in ipairs(order) do out[#out + 1] = { [col] = key, sum = sums[key] } end
  table.sort(out, function(a, b) return a.sum > b.sum end)
  return out
end

function tbl.mean_by(rows, col, value_col)
  local sums, counts, order = {}, {}, {}
  for _, row in ipairs(rows) do
    local key = row[col]
    local value = tonumber(row[value_col])
    if key ~= nil and value ~= nil then
      key = tostring(key)
      if sums[key] == nil then sums[key] = 0; counts[key] = 0; order[#order + 1] = key end
      sums[key] = sums[key] + value
      counts[key] = counts[key] + 1
    end
  end
  local out = {}
  for _, key in ipairs(order) do
    out[#out + 1] = { [col] = key, mean = sums[key] / counts[key] }
  end
  table.sort(out, function(a, b) return a.mean > b.mean end)
  return out
end

-- period: "year", "month" or "day"; relies on ISO-formatted date strings
function tbl.count_by_period(rows, date_col, period)
  local width = 10
  if period == "year" then width = 4 elseif period == "month" then width = 7 end
  local counts, order = {}, {}
  for _, row in ipairs(rows) do
    local raw = row[date_col]
    if raw ~= nil then
      local key = string.sub(tostring(raw), 1, width)
      if counts[key] == nil then counts[key] = 0; order[#order + 1] = key end
      counts[key] = counts[key] + 1
    end
  end
  table.sort(order)
  local out = {}
  for _, key in ipairs(order) do out[#out + 1] = { period = key, count = counts[key] } end
  return out
end

function tbl.filter_eq(rows, col, value)
  local out = {}
  for _, row in ipairs(rows) do
    if row[col] == value then out[#out + 1] = row end
  end
  return out
end

function tbl.sort_by(rows, col, descending)
  local out = {}
  for i, row in ipairs(rows) do out[i] = row end
  table.sort(out, function(a, b)
    local av, bv = a[col], b[col]
    if av == nil or bv == nil then return bv == nil and av ~= nil end
    if descending then return av > bv end
    return av < bv
  end)
  return out
end

function tbl.head(rows, n)
  local out = {}
  for i = 1, math.min(n, #rows) do out[i] = rows[i] end
  return out
end

chart = {}

local function trace_column(rows, col)
  local out = {}
  for _, row in ipairs(rows) do out[#out + 1] = row[col] end
  return out
end

function chart.bar(rows, x_col, y_col, title)
  return {
    title = title,
    x_label = x_col,
    y_label = y_col,
    traces = { { name = y_col, x = trace_column(rows, x_col), y = trace_column(rows, y_col) } },
  }
end

function chart.line(rows, x_col, y_col, title)
  return {
    title = title,
    x_label = x_col,
    y_label = y_col,
    traces = { { name = y_col, x = trace_column(rows, x_col), y = trace_column(rows, y_col) } },
  }
end

function chart.pie(rows, names_col, values_col, title)
  return {
    title = title,
    traces = { { name = title, x = trace_column(rows, names_col), y = trace_column(rows, values_col) } },
  }
end

function chart.scatter(rows, x_col, y_col, title)
  return {
    title = title,
    x_label = x_col,
    y_label = y_col,
    traces = { { name = y_col, x = trace_column(rows, x_col), y = trace_column(rows, y_col) } },
  }
end
"#;

/// Installed after the data is injected: reading an unknown column raises
/// an error naming it, while null cells of real columns stay nil.
const DATA_GUARD: &str = r#"
do
  local valid = {}
  for i = 1, #columns do valid[columns[i]] = true end
  local guard = {
    __index = function(_, key)
      if valid[key] then return nil end
      error("column '" .. tostring(key) .. "' does not exist", 2)
    end,
  }
  for i = 1, #data do setmetatable(data[i], guard) end
end
"#;

/// Output buffer state (shared between print() and the executor)
struct OutputState {
    lines: Vec<String>,
    truncated: bool,
}

impl OutputState {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            truncated: false,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() < MAX_OUTPUT_LINES {
            self.lines.push(line);
        } else {
            self.truncated = true;
        }
    }
}

/// Execute generated code against a copy of the dataset and extract the
/// three expected bindings. Never raises past this boundary.
pub fn execute(code: &str, dataset: &Dataset, opts: &SandboxOptions) -> ExecutionResult {
    let lua = Lua::new();
    let output_state = Rc::new(RefCell::new(OutputState::new()));

    if let Err(err) = setup_namespace(&lua, dataset, output_state.clone()) {
        return ExecutionResult::Failure {
            error: bounded(&format!("sandbox setup failed: {}", err), MAX_ERROR_LEN),
            stack_summary: String::new(),
            timed_out: false,
            output: Vec::new(),
        };
    }

    let start_time = Instant::now();
    let timeout = opts.timeout;
    let budget = Arc::new(AtomicI64::new(opts.instruction_limit));
    let budget_clone = budget.clone();
    let instruction_limit = opts.instruction_limit;
    let was_timed_out = Arc::new(AtomicBool::new(false));
    let was_timed_out_clone = was_timed_out.clone();

    lua.set_hook(
        HookTriggers::new().every_nth_instruction(INSTRUCTION_HOOK_INTERVAL),
        move |_lua, _debug| {
            // Wall-clock deadline first: it is the hard cancellation point
            if start_time.elapsed() > timeout {
                was_timed_out_clone.store(true, Ordering::Relaxed);
                return Err(mlua::Error::RuntimeError(format!(
                    "execution timeout ({}s limit)",
                    timeout.as_secs()
                )));
            }

            let remaining =
                budget_clone.fetch_sub(INSTRUCTION_HOOK_INTERVAL as i64, Ordering::Relaxed);
            if remaining <= 0 {
                Err(mlua::Error::RuntimeError(format!(
                    "instruction limit exceeded ({} instructions)",
                    instruction_limit
                )))
            } else {
                Ok(VmState::Continue)
            }
        },
    );

    let result = lua.load(code).exec();

    lua.remove_hook();

    let state = output_state.borrow();
    let mut output = state.lines.clone();
    if state.truncated {
        output.push(format!("... output truncated ({} line limit)", MAX_OUTPUT_LINES));
    }
    drop(state);

    match result {
        Err(err) => {
            let (error, stack_summary) = summarize_error(&err);
            ExecutionResult::Failure {
                error,
                stack_summary,
                timed_out: was_timed_out.load(Ordering::Relaxed),
                output,
            }
        }
        Ok(()) => extract_bindings(&lua, output),
    }
}

/// [`execute`] on a blocking thread. The in-hook deadline guarantees the
/// thread returns; a panicked sandbox task becomes a failure, not a crash.
pub async fn execute_blocking(
    code: String,
    dataset: Dataset,
    opts: SandboxOptions,
) -> ExecutionResult {
    match tokio::task::spawn_blocking(move || execute(&code, &dataset, &opts)).await {
        Ok(result) => result,
        Err(err) => ExecutionResult::Failure {
            error: format!("sandbox task failed: {}", err),
            stack_summary: String::new(),
            timed_out: false,
            output: Vec::new(),
        },
    }
}

fn setup_namespace(
    lua: &Lua,
    dataset: &Dataset,
    output_state: Rc<RefCell<OutputState>>,
) -> mlua::Result<()> {
    let globals = lua.globals();

    // Override print() to capture output (with cap)
    let print_fn = lua.create_function(move |_, args: MultiValue| {
        let parts: Vec<String> = args.into_iter().map(|v| lua_value_to_string(&v)).collect();
        output_state.borrow_mut().push(parts.join("\t"));
        Ok(())
    })?;
    globals.set("print", print_fn)?;

    // Sandbox: remove everything that reaches outside the state.
    // Kept: basic, string, table, math, utf8.
    for name in [
        "os", "io", "debug", "package", "require", "load", "loadfile", "dofile",
    ] {
        globals.set(name, LuaValue::Nil)?;
    }

    lua.load(PRELUDE).exec()?;

    let rows = dataset.to_json_rows();
    globals.set("data", lua.to_value(&rows)?)?;
    globals.set("columns", lua.to_value(&dataset.columns)?)?;
    lua.load(DATA_GUARD).exec()?;

    Ok(())
}

fn lua_value_to_string(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        LuaValue::String(s) => s
            .to_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|_| "<invalid utf8>".to_string()),
        other => format!("<{}>", other.type_name()),
    }
}

fn extract_bindings(lua: &Lua, output: Vec<String>) -> ExecutionResult {
    let mut problems: Vec<String> = Vec::new();

    let chart_type = match required_global(lua, BINDING_CHART_TYPE) {
        Ok(value) => lua
            .from_value::<String>(value)
            .map_err(|e| problems.push(binding_shape_error(BINDING_CHART_TYPE, &e)))
            .ok(),
        Err(missing) => {
            problems.push(missing);
            None
        }
    };

    let plot_data = match required_global(lua, BINDING_PLOT_DATA) {
        Ok(value) => lua
            .from_value::<Vec<PlotRow>>(value)
            .map_err(|e| problems.push(binding_shape_error(BINDING_PLOT_DATA, &e)))
            .ok(),
        Err(missing) => {
            problems.push(missing);
            None
        }
    };

    let figure = match required_global(lua, BINDING_FIG) {
        Ok(value) => lua
            .from_value::<FigureSpec>(value)
            .map_err(|e| problems.push(binding_shape_error(BINDING_FIG, &e)))
            .ok(),
        Err(missing) => {
            problems.push(missing);
            None
        }
    };

    match (figure, chart_type, plot_data) {
        (Some(figure), Some(chart_type), Some(plot_data)) => ExecutionResult::Success {
            figure,
            chart_type,
            plot_data,
            output,
        },
        _ => ExecutionResult::Failure {
            error: bounded(&problems.join("; "), MAX_ERROR_LEN),
            stack_summary: String::new(),
            timed_out: false,
            output,
        },
    }
}

fn required_global(lua: &Lua, name: &str) -> Result<LuaValue, String> {
    match lua.globals().get::<LuaValue>(name) {
        Ok(LuaValue::Nil) => Err(format!("generated code did not define `{}`", name)),
        Ok(value) => Ok(value),
        Err(err) => Err(format!("failed to read `{}`: {}", name, err)),
    }
}

fn binding_shape_error(name: &str, err: &mlua::Error) -> String {
    format!("binding `{}` has the wrong shape: {}", name, err)
}

/// Split an execution error into a bounded message and a short traceback.
fn summarize_error(err: &mlua::Error) -> (String, String) {
    let full = err.to_string();
    let (message, traceback) = match full.find("stack traceback:") {
        Some(pos) => (full[..pos].trim().to_string(), full[pos..].to_string()),
        None => (full.trim().to_string(), String::new()),
    };
    let stack_summary = traceback
        .lines()
        .take(MAX_STACK_LINES)
        .collect::<Vec<_>>()
        .join("\n");
    (bounded(&message, MAX_ERROR_LEN), stack_summary)
}

fn bounded(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}
