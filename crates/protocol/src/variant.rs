//! Selbstbeschreibende, typisierte Nutzdaten-Kodierung
//!
//! Jede Nutzlast beginnt mit ihrer Typsignatur, danach folgen die Werte
//! in kanonischer Form (big-endian, unabhaengig von der Host-Byte-Order).
//!
//! ## Format
//!
//! ```text
//! +----------------+---------------------+-------------------+
//! | Sig-Laenge u16 | Signatur (ASCII)    | Werte             |
//! +----------------+---------------------+-------------------+
//! ```
//!
//! ## Signatur-Alphabet
//!
//! | Zeichen | Typ    | Kodierung                     |
//! |---------|--------|-------------------------------|
//! | `x`     | i64    | 8 Bytes                       |
//! | `t`     | u64    | 8 Bytes                       |
//! | `u`     | u32    | 4 Bytes                       |
//! | `q`     | u16    | 2 Bytes                       |
//! | `s`     | String | u32 Laenge + UTF-8            |
//! | `(..)`  | Tupel  | Felder hintereinander         |
//! | `aT`    | Array  | u32 Anzahl + Elemente vom Typ T |

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{WireError, WireResult};

/// Maximale Verschachtelungstiefe einer Signatur
const MAX_TIEFE: usize = 16;

// ---------------------------------------------------------------------------
// Signatur
// ---------------------------------------------------------------------------

/// Geparste Typsignatur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signatur {
    I64,
    U64,
    U32,
    U16,
    Str,
    Tupel(Vec<Signatur>),
    Array(Box<Signatur>),
}

impl Signatur {
    /// Parst eine vollstaendige Signatur wie `(xsa(ss))`
    pub fn parsen(text: &str) -> WireResult<Self> {
        let bytes = text.as_bytes();
        let mut pos = 0;
        let sig = Self::element_parsen(bytes, &mut pos, 0)?;
        if pos != bytes.len() {
            return Err(WireError::Signatur(format!(
                "ueberzaehlige Zeichen in '{}'",
                text
            )));
        }
        Ok(sig)
    }

    fn element_parsen(bytes: &[u8], pos: &mut usize, tiefe: usize) -> WireResult<Self> {
        if tiefe > MAX_TIEFE {
            return Err(WireError::Signatur("zu tief verschachtelt".into()));
        }
        let zeichen = *bytes
            .get(*pos)
            .ok_or_else(|| WireError::Signatur("unerwartetes Ende".into()))?;
        *pos += 1;

        match zeichen {
            b'x' => Ok(Self::I64),
            b't' => Ok(Self::U64),
            b'u' => Ok(Self::U32),
            b'q' => Ok(Self::U16),
            b's' => Ok(Self::Str),
            b'a' => Ok(Self::Array(Box::new(Self::element_parsen(
                bytes,
                pos,
                tiefe + 1,
            )?))),
            b'(' => {
                let mut felder = Vec::new();
                loop {
                    match bytes.get(*pos) {
                        Some(b')') => {
                            *pos += 1;
                            break;
                        }
                        Some(_) => felder.push(Self::element_parsen(bytes, pos, tiefe + 1)?),
                        None => return Err(WireError::Signatur("Tupel nicht geschlossen".into())),
                    }
                }
                // Leere Tupel haetten Groesse 0 und machen Array-Laengen unpruefbar
                if felder.is_empty() {
                    return Err(WireError::Signatur("leeres Tupel".into()));
                }
                Ok(Self::Tupel(felder))
            }
            andere => Err(WireError::Signatur(format!(
                "unbekanntes Typzeichen '{}'",
                andere as char
            ))),
        }
    }
}

impl std::fmt::Display for Signatur {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signatur::I64 => f.write_str("x"),
            Signatur::U64 => f.write_str("t"),
            Signatur::U32 => f.write_str("u"),
            Signatur::U16 => f.write_str("q"),
            Signatur::Str => f.write_str("s"),
            Signatur::Array(element) => write!(f, "a{}", element),
            Signatur::Tupel(felder) => {
                f.write_str("(")?;
                for feld in felder {
                    write!(f, "{}", feld)?;
                }
                f.write_str(")")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wert
// ---------------------------------------------------------------------------

/// Ein typisierter Wert der Nutzdaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wert {
    I64(i64),
    U64(u64),
    U32(u32),
    U16(u16),
    Str(String),
    Tupel(Vec<Wert>),
    Array(Vec<Wert>),
}

impl Wert {
    /// Prueft ob der Wert strukturell zur Signatur passt
    pub fn passt_zu(&self, sig: &Signatur) -> bool {
        match (self, sig) {
            (Wert::I64(_), Signatur::I64)
            | (Wert::U64(_), Signatur::U64)
            | (Wert::U32(_), Signatur::U32)
            | (Wert::U16(_), Signatur::U16)
            | (Wert::Str(_), Signatur::Str) => true,
            (Wert::Tupel(werte), Signatur::Tupel(felder)) => {
                werte.len() == felder.len()
                    && werte.iter().zip(felder).all(|(w, f)| w.passt_zu(f))
            }
            (Wert::Array(werte), Signatur::Array(element)) => {
                werte.iter().all(|w| w.passt_zu(element))
            }
            _ => false,
        }
    }

    /// Signatur des Wertes (nur fuer Diagnose; leere Arrays als `a?`)
    pub fn signatur(&self) -> String {
        match self {
            Wert::I64(_) => "x".into(),
            Wert::U64(_) => "t".into(),
            Wert::U32(_) => "u".into(),
            Wert::U16(_) => "q".into(),
            Wert::Str(_) => "s".into(),
            Wert::Array(werte) => match werte.first() {
                Some(erster) => format!("a{}", erster.signatur()),
                None => "a?".into(),
            },
            Wert::Tupel(werte) => {
                let innen: String = werte.iter().map(Wert::signatur).collect();
                format!("({})", innen)
            }
        }
    }

    /// Schreibt den Wert in kanonischer Form (big-endian)
    pub fn schreiben(&self, buf: &mut BytesMut) {
        match self {
            Wert::I64(v) => buf.put_i64(*v),
            Wert::U64(v) => buf.put_u64(*v),
            Wert::U32(v) => buf.put_u32(*v),
            Wert::U16(v) => buf.put_u16(*v),
            Wert::Str(s) => {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Wert::Tupel(werte) => {
                for w in werte {
                    w.schreiben(buf);
                }
            }
            Wert::Array(werte) => {
                buf.put_u32(werte.len() as u32);
                for w in werte {
                    w.schreiben(buf);
                }
            }
        }
    }

    /// Liest einen Wert gemaess Signatur und verbraucht die gelesenen Bytes
    pub fn lesen(sig: &Signatur, buf: &mut &[u8]) -> WireResult<Wert> {
        match sig {
            Signatur::I64 => {
                bedarf(buf, 8)?;
                Ok(Wert::I64(buf.get_i64()))
            }
            Signatur::U64 => {
                bedarf(buf, 8)?;
                Ok(Wert::U64(buf.get_u64()))
            }
            Signatur::U32 => {
                bedarf(buf, 4)?;
                Ok(Wert::U32(buf.get_u32()))
            }
            Signatur::U16 => {
                bedarf(buf, 2)?;
                Ok(Wert::U16(buf.get_u16()))
            }
            Signatur::Str => {
                bedarf(buf, 4)?;
                let laenge = buf.get_u32() as usize;
                bedarf(buf, laenge)?;
                let text = std::str::from_utf8(&buf[..laenge])
                    .map_err(|e| WireError::ungueltig(format!("String kein UTF-8: {}", e)))?
                    .to_owned();
                buf.advance(laenge);
                Ok(Wert::Str(text))
            }
            Signatur::Tupel(felder) => {
                let mut werte = Vec::with_capacity(felder.len());
                for feld in felder {
                    werte.push(Self::lesen(feld, buf)?);
                }
                Ok(Wert::Tupel(werte))
            }
            Signatur::Array(element) => {
                bedarf(buf, 4)?;
                let anzahl = buf.get_u32() as usize;
                // Jedes Element belegt mindestens ein Byte
                if anzahl > buf.remaining() {
                    return Err(WireError::Abgeschnitten);
                }
                let mut werte = Vec::with_capacity(anzahl);
                for _ in 0..anzahl {
                    werte.push(Self::lesen(element, buf)?);
                }
                Ok(Wert::Array(werte))
            }
        }
    }
}

fn bedarf(buf: &&[u8], anzahl: usize) -> WireResult<()> {
    if buf.remaining() < anzahl {
        Err(WireError::Abgeschnitten)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Nutzdaten
// ---------------------------------------------------------------------------

/// Kodiert Signatur und Wert als vollstaendige Nutzlast
pub fn nutzdaten_kodieren(signatur: &str, wert: &Wert, buf: &mut BytesMut) -> WireResult<()> {
    let sig = Signatur::parsen(signatur)?;
    if !wert.passt_zu(&sig) {
        return Err(WireError::typ_fehler(signatur, wert.signatur()));
    }
    buf.put_u16(signatur.len() as u16);
    buf.put_slice(signatur.as_bytes());
    wert.schreiben(buf);
    Ok(())
}

/// Dekodiert eine Nutzlast gegen die erwartete Signatur
///
/// Eine abweichende Signatur ist ein `TypFehler`, ueberzaehlige Bytes
/// sind `Ungueltig`.
pub fn nutzdaten_dekodieren(erwartet: &str, mut daten: &[u8]) -> WireResult<Wert> {
    bedarf(&daten, 2)?;
    let sig_laenge = daten.get_u16() as usize;
    bedarf(&daten, sig_laenge)?;
    let sig_text = std::str::from_utf8(&daten[..sig_laenge])
        .map_err(|_| WireError::Signatur("Signatur kein ASCII".into()))?
        .to_owned();
    daten.advance(sig_laenge);

    if sig_text != erwartet {
        return Err(WireError::typ_fehler(erwartet, sig_text));
    }

    let sig = Signatur::parsen(erwartet)?;
    let wert = Wert::lesen(&sig, &mut daten)?;
    if daten.has_remaining() {
        return Err(WireError::ungueltig(format!(
            "{} ueberzaehlige Bytes",
            daten.remaining()
        )));
    }
    Ok(wert)
}

// ---------------------------------------------------------------------------
// TupelLeser
// ---------------------------------------------------------------------------

/// Liest die Felder eines Tupels der Reihe nach mit Typpruefung
pub struct TupelLeser {
    felder: std::vec::IntoIter<Wert>,
}

impl TupelLeser {
    pub fn neu(wert: Wert) -> WireResult<Self> {
        match wert {
            Wert::Tupel(felder) => Ok(Self {
                felder: felder.into_iter(),
            }),
            andere => Err(WireError::typ_fehler("(..)", andere.signatur())),
        }
    }

    fn naechster(&mut self) -> WireResult<Wert> {
        self.felder
            .next()
            .ok_or_else(|| WireError::ungueltig("Tupel hat zu wenige Felder"))
    }

    pub fn i64(&mut self) -> WireResult<i64> {
        match self.naechster()? {
            Wert::I64(v) => Ok(v),
            w => Err(WireError::typ_fehler("x", w.signatur())),
        }
    }

    pub fn u64(&mut self) -> WireResult<u64> {
        match self.naechster()? {
            Wert::U64(v) => Ok(v),
            w => Err(WireError::typ_fehler("t", w.signatur())),
        }
    }

    pub fn u16(&mut self) -> WireResult<u16> {
        match self.naechster()? {
            Wert::U16(v) => Ok(v),
            w => Err(WireError::typ_fehler("q", w.signatur())),
        }
    }

    pub fn string(&mut self) -> WireResult<String> {
        match self.naechster()? {
            Wert::Str(v) => Ok(v),
            w => Err(WireError::typ_fehler("s", w.signatur())),
        }
    }

    pub fn array(&mut self) -> WireResult<Vec<Wert>> {
        match self.naechster()? {
            Wert::Array(v) => Ok(v),
            w => Err(WireError::typ_fehler("a", w.signatur())),
        }
    }
}
