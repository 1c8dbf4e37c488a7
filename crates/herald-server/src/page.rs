//! The chat page served at `/`.

/// Minimal browser client: connects to `/ws` on the same host, shows every
/// text frame and sends the input line on submit.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>herald</title>
<style>
  body { font-family: sans-serif; max-width: 40rem; margin: 2rem auto; }
  #log { list-style: none; padding: 0; }
  #log li { padding: 0.2rem 0; border-bottom: 1px solid #eee; }
</style>
</head>
<body>
<h1>herald</h1>
<form id="form">
  <input id="text" autocomplete="off" autofocus>
  <button>Send</button>
</form>
<ul id="log"></ul>
<script>
  const scheme = location.protocol === "https:" ? "wss://" : "ws://";
  const ws = new WebSocket(scheme + location.host + "/ws");
  const log = document.getElementById("log");
  const append = (text) => {
    const item = document.createElement("li");
    item.textContent = text;
    log.appendChild(item);
  };
  ws.onmessage = (event) => append(event.data);
  ws.onclose = () => append("connection closed");
  document.getElementById("form").onsubmit = (event) => {
    event.preventDefault();
    const input = document.getElementById("text");
    if (input.value) {
      ws.send(input.value);
      input.value = "";
    }
  };
</script>
</body>
</html>
"#;
