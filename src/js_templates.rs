pub fn escape_js_string(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace("</", "<\\/")
}

/// Absolute URLs of every link-like element in the current document.
pub const COLLECT_LINKS: &str = r#"(function(){const out=new Set();const add=v=>{try{if(v)out.add(new URL(v,document.baseURI).href)}catch(e){}};document.querySelectorAll('a[href],area[href]').forEach(el=>add(el.getAttribute('href')));document.querySelectorAll('form[action]').forEach(el=>add(el.getAttribute('action')));document.querySelectorAll('iframe[src],frame[src]').forEach(el=>add(el.getAttribute('src')));return Array.from(out)})()"#;

/// Silences `alert`, `confirm` and `prompt` so a page cannot stall a tab.
pub const SUPPRESS_DIALOGS: &str = r#"(function(){window.alert=function(){};window.confirm=function(){return true};window.prompt=function(){return null}})()"#;

/// Fills the first login form found once the document has loaded.
pub fn login_autofill(username: &str, password: &str) -> String {
    let user = escape_js_string(username);
    let pass = escape_js_string(password);
    format!(
        r#"(function(){{const fill=()=>{{const pw=document.querySelector('input[type=password]');if(!pw||pw.dataset.crawlerFilled)return;const form=pw.form||document;const user=form.querySelector('input[type=email],input[type=text],input:not([type])');const set=(el,v)=>{{el.focus();el.value=v;el.dispatchEvent(new Event('input',{{bubbles:true}}));el.dispatchEvent(new Event('change',{{bubbles:true}}))}};if(user)set(user,'{}');set(pw,'{}');pw.dataset.crawlerFilled='1'}};if(document.readyState==='loading'){{document.addEventListener('DOMContentLoaded',fill)}}else{{fill()}}}})()"#,
        user, pass
    )
}
