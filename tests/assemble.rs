extern crate eventasm;
extern crate parameterized;

mod common;

#[cfg(test)]
mod assemble {
    use eventasm::EngineKind;
    use parameterized::parameterized;

    use crate::common::{assemble, assembled, image};

    const BASICS: &str = r#"
ORG 0x100
SET(-2)
TEXT(0x1234)
NAME("Seth")
MOVE([3, 4])
"#;

    const FORWARD: &str = "
ORG 0x100
SET(COUNT)
CALL(sub)
COUNT = last - first
first:
SET(0)
SET(0)
last:
sub:
END
";

    const INLINE: &str = r#"
ORG 0x100
TABLE([1, 2, 3])
LOAD([1, 2, 3, 4, 0, 0, 0, 0])
TABLE("hi")
CALL(sub)
sub:
END
"#;

    const DIRECTIVES: &str = r#"
ORG 0x100
PUSH
ORG 0x180
WORD 1, 2
POP
BYTE "ab", 3
ALIGN 4
SHORT -1
FILL 3, 0xEE
POIN here, 0
here:
WORD CURRENTOFFSET
"#;

    const MACROS: &str = "
#define VALUE 3
#define TWICE(x) SET(x + x)
ORG 0x100
TWICE(VALUE)
#ifdef VALUE
SET(1)
#else
SET(2)
#endif
";

    #[parameterized(script = { BASICS, FORWARD, INLINE, DIRECTIVES, MACROS })]
    fn engines_agree(script: &str) {
        let classic = assembled(EngineKind::Classic, script);
        let colorz = assembled(EngineKind::Colorz, script);
        assert_eq!(classic.as_bytes(), colorz.as_bytes());
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn encodes_parameters(engine: EngineKind) {
        let rom = assembled(engine, BASICS);
        assert_eq!(rom.read(0x100, 4), Some(&[0x05, 0, 0xFE, 0xFF][..]));
        assert_eq!(rom.read(0x104, 4), Some(&[0x06, 0, 0x34, 0x12][..]));
        assert_eq!(rom.read(0x108, 12), Some(&b"\x07\0\0\0Seth\0\0\0\0"[..]));
        assert_eq!(rom.read(0x114, 4), Some(&[0x09, 0, 3, 4][..]));
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn directives(engine: EngineKind) {
        let rom = assembled(engine, DIRECTIVES);
        assert_eq!(rom.read(0x180, 8), Some(&[1, 0, 0, 0, 2, 0, 0, 0][..]));
        assert_eq!(rom.read(0x100, 4), Some(&[b'a', b'b', 3, 0][..]));
        assert_eq!(rom.read(0x104, 5), Some(&[0xFF, 0xFF, 0xEE, 0xEE, 0xEE][..]));
        assert_eq!(
            rom.read(0x109, 12),
            Some(&[0x11, 0x01, 0, 0x08, 0, 0, 0, 0, 0x11, 0x01, 0, 0][..])
        );
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn forward_references(engine: EngineKind) {
        let later = assembled(engine, "ORG 0x100\nCALL(target)\nEND\nORG 0x180\ntarget:\nEND\n");
        let first = assembled(engine, "ORG 0x180\ntarget:\nEND\nORG 0x100\nCALL(target)\nEND\n");
        assert_eq!(later.as_bytes(), first.as_bytes());
        assert_eq!(later.read(0x104, 4), Some(&[0x80, 0x01, 0, 0x08][..]));

        let rom = assembled(engine, FORWARD);
        assert_eq!(rom.read(0x100, 4), Some(&[0x05, 0, 8, 0][..]));
        assert_eq!(rom.read(0x108, 4), Some(&[0x14, 0x01, 0, 0x08][..]));
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn macros_and_conditions(engine: EngineKind) {
        let rom = assembled(engine, MACROS);
        assert_eq!(rom.read(0x100, 8), Some(&[0x05, 0, 6, 0, 0x05, 0, 1, 0][..]));
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn deterministic(engine: EngineKind) {
        let script = "ORG 0x100\nCALL(missing)\nTABLE([1, 2])\nSET(100000)\n";
        let mut first = image();
        let mut second = image();
        let a = assemble(engine, script, &mut first);
        let b = assemble(engine, script, &mut second);
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(first, second);

        let a = assembled(engine, INLINE);
        let b = assembled(engine, INLINE);
        assert_eq!(a, b);
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn unresolved_symbols_are_reported_once(engine: EngineKind) {
        let mut rom = image();
        let outcome = assemble(engine, "ORG 0x100\nCALL(nowhere)\nCALL(nowhere)\n", &mut rom);
        assert!(!outcome.success);
        assert_eq!(outcome.log.error_count(), 1);
        let text = outcome.to_string();
        assert!(text.contains("undefined symbol \"nowhere\""), "{text}");
        assert!(text.contains("first used at test.event:2:1"), "{text}");
        assert_eq!(rom, image());
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn failures_leave_the_image_alone(engine: EngineKind) {
        let cases = [
            (
                "ORG 0x100\nSET(1)\nSET(100000)\n",
                "value 100000 does not fit in 2 byte(s)",
            ),
            (
                "PROTECT 0x100, 0x110\nORG 0x104\nSET(1)\n",
                "write at $00000104 overlaps protected region $00000100..$00000110",
            ),
            (
                "ORG 0x3FE\nSET(1)\n",
                "write of 4 bytes at $000003FE is outside the image",
            ),
            (
                "ORG 0x100\nstart:\nSET(1)\nend:\nASSERT end - start - 4\nASSERT start - end\n",
                "assertion failed",
            ),
            (
                "ORG 0x100\nFILL 0x7FFFFFFF\n",
                "write of 2147483647 bytes at $00000100 is outside the image",
            ),
            ("ORG 0x100\nPOP\n", "POP without matching PUSH"),
            ("ORG later\nlater:\n", "ORG requires a value known at this point"),
            ("a:\na:\n", "symbol \"a\" already defined"),
            ("ERROR \"stop\"\n", "stop"),
        ];
        for (script, message) in cases {
            let mut rom = image();
            let outcome = assemble(engine, script, &mut rom);
            assert!(!outcome.success, "{script}");
            assert_eq!(outcome.log.error_count(), 1, "{script}: {outcome}");
            assert_eq!(outcome.log.diagnostics()[0].message, message);
            assert_eq!(rom, image(), "{script}");
        }
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn text_is_written_as_utf8(engine: EngineKind) {
        let rom = assembled(engine, "ORG 0x100\nNAME(\"é\")\nNAME(\"éééé\")\n");
        assert_eq!(rom.read(0x100, 12), Some(&b"\x07\0\0\0\xC3\xA9\0\0\0\0\0\0"[..]));
        assert_eq!(rom.read(0x110, 8), Some(&b"\xC3\xA9\xC3\xA9\xC3\xA9\xC3\xA9"[..]));

        let mut rom = image();
        let outcome = assemble(engine, "ORG 0x100\nNAME(\"ééééé\")\n", &mut rom);
        assert!(!outcome.success);
        assert_eq!(rom, image());
    }

    #[parameterized(engine = { EngineKind::Classic, EngineKind::Colorz })]
    fn misaligned_codes_warn(engine: EngineKind) {
        let mut rom = image();
        let outcome = assemble(engine, "ORG 0x102\nLOAD(0)\n", &mut rom);
        assert!(outcome.success);
        assert_eq!(
            outcome.to_string(),
            "test.event:2:1: warning: code \"LOAD\" at $00000102 is not aligned to 4 bytes\n"
        );
        assert_eq!(rom.read(0x102, 4), Some(&[0x01, 0, 0, 0][..]));
    }
}
