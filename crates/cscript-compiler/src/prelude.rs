//! The C prelude prepended to every generated translation unit.
//!
//! Defines the zero-cost macro surface the lowered body relies on
//! (`print`, `likely`, `defer`, the exhaustive-switch markers, the
//! `@unsafe` pragma pairs, `CS_HOT`) plus the profiler runtime, which is
//! only compiled in when the build defines `CS_PROFILE_BUILD`. The
//! instrumented binary flushes its counts to the path named by the
//! `CS_PROFILE_OUT` environment variable on exit.

/// Environment variable the instrumented binary reads for its counts path.
pub const PROFILE_OUT_ENV: &str = "CS_PROFILE_OUT";

/// Emit the prelude. `hardline` enables the runtime-check define consumed
/// by the enum assertion helpers.
pub fn emit_prelude(hardline: bool) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(
        r#"// --- C-Script prelude (zero-cost) ---
#include <stdio.h>
#include <stdint.h>
#include <stddef.h>
#include <stdlib.h>
#include <string.h>
#include <stdbool.h>

#define print(...) printf(__VA_ARGS__)
#if defined(__GNUC__) || defined(__clang__)
  #define likely(x)   __builtin_expect(!!(x),1)
  #define unlikely(x) __builtin_expect(!!(x),0)
#else
  #define likely(x)   (x)
  #define unlikely(x) (x)
#endif

// ---- Resource management with 'defer' ----
#define CS_CONCAT2(a,b) a##b
#define CS_CONCAT(a,b)  CS_CONCAT2(a,b)
#define defer(body) for (int CS_CONCAT(_cs_defer_, __COUNTER__) = 0; \
                         CS_CONCAT(_cs_defer_, __COUNTER__) == 0; \
                         (void)(body), CS_CONCAT(_cs_defer_, __COUNTER__)=1)

// ---- Exhaustive switch helpers (enum-specific assert is emitted per declaration) ----
#define CS_SWITCH_EXHAUSTIVE(T, expr) do { int __cs_hit=0; T __cs_v=(expr); switch(__cs_v){
#define CS_CASE(x) case x: __cs_hit=1
#define CS_SWITCH_END(T, expr) default: break; } if(!__cs_hit) cs__enum_assert_##T(__cs_v); } while(0)

// ---- @unsafe pragmas ----
#if defined(_MSC_VER)
  #define CS_PRAGMA_PUSH __pragma(warning(push))
  #define CS_PRAGMA_POP  __pragma(warning(pop))
  #define CS_PRAGMA_RELAX __pragma(warning(disable:4244 4267 4018 4389))
#else
  #define CS_PRAGMA_PUSH _Pragma("GCC diagnostic push")
  #define CS_PRAGMA_POP  _Pragma("GCC diagnostic pop")
  #define CS_PRAGMA_RELAX _Pragma("GCC diagnostic ignored \"-Wconversion\"") \
                          _Pragma("GCC diagnostic ignored \"-Wsign-conversion\"") \
                          _Pragma("GCC diagnostic ignored \"-Wenum-conversion\"")
#endif
#define CS_UNSAFE_BEGIN do { CS_PRAGMA_PUSH; CS_PRAGMA_RELAX; } while(0)
#define CS_UNSAFE_END   do { CS_PRAGMA_POP; } while(0)

// ---- Function attributes for PGO ----
#if defined(_MSC_VER)
  #define CS_HOT
#else
  #define CS_HOT __attribute__((hot))
#endif
"#,
    );

    if hardline {
        out.push_str("\n#define CS_HARDLINE 1\n");
    }

    out.push_str(
        r#"
#ifdef CS_PROFILE_BUILD
typedef struct { const char* name; unsigned long long count; } _cs_prof_ent;
static _cs_prof_ent* _cs_prof_tbl = 0;
static size_t _cs_prof_cap = 0, _cs_prof_len = 0;
static FILE* _cs_prof_f = NULL;

static void _cs_prof_flush(void){
    if(!_cs_prof_f){
        const char* path = getenv("CS_PROFILE_OUT");
        if(!path) return;
        _cs_prof_f = fopen(path, "wb");
        if(!_cs_prof_f) return;
    }
    for(size_t i=0;i<_cs_prof_len;i++){
        if(_cs_prof_tbl[i].name){
            fprintf(_cs_prof_f, "%s %llu\n", _cs_prof_tbl[i].name, (unsigned long long)_cs_prof_tbl[i].count);
        }
    }
    fclose(_cs_prof_f); _cs_prof_f=NULL;
}

static void _cs_prof_init(void){
    atexit(_cs_prof_flush);
}

#if defined(__GNUC__) || defined(__clang__)
__attribute__((constructor))
#endif
static void _cs_prof_ctor(void){ _cs_prof_init(); }

static void cs_prof_hit(const char* name){
    for(size_t i=0;i<_cs_prof_len;i++){
        if(_cs_prof_tbl[i].name && strcmp(_cs_prof_tbl[i].name,name)==0){ _cs_prof_tbl[i].count++; return; }
    }
    if(_cs_prof_len==_cs_prof_cap){
        size_t ncap = _cs_prof_cap? _cs_prof_cap*2 : 32;
        _cs_prof_tbl = (_cs_prof_ent*)realloc(_cs_prof_tbl, ncap*sizeof(_cs_prof_ent));
        for(size_t i=_cs_prof_cap;i<ncap;i++){ _cs_prof_tbl[i].name=NULL; _cs_prof_tbl[i].count=0; }
        _cs_prof_cap = ncap;
    }
    _cs_prof_tbl[_cs_prof_len].name = name;
    _cs_prof_tbl[_cs_prof_len].count = 1;
    _cs_prof_len++;
}
#else
static void cs_prof_hit(const char* name){ (void)name; }
#endif
"#,
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardline_define_is_conditional() {
        assert!(emit_prelude(true).contains("#define CS_HARDLINE 1"));
        assert!(!emit_prelude(false).contains("#define CS_HARDLINE 1"));
    }

    #[test]
    fn prelude_defines_switch_markers() {
        let prelude = emit_prelude(true);
        assert!(prelude.contains("#define CS_SWITCH_EXHAUSTIVE(T, expr)"));
        assert!(prelude.contains("#define CS_CASE(x)"));
        assert!(prelude.contains("#define CS_SWITCH_END(T, expr)"));
    }

    #[test]
    fn profiler_runtime_reads_profile_out_env() {
        let prelude = emit_prelude(false);
        assert!(prelude.contains("#ifdef CS_PROFILE_BUILD"));
        assert!(prelude.contains(&format!("getenv(\"{PROFILE_OUT_ENV}\")")));
        assert!(prelude.contains("cs_prof_hit"));
    }

    #[test]
    fn unsafe_pragmas_are_paired() {
        let prelude = emit_prelude(true);
        assert!(prelude.contains("#define CS_UNSAFE_BEGIN"));
        assert!(prelude.contains("#define CS_UNSAFE_END"));
    }
}
