//! # Script de Edição Mínimo (SES) para Indução de Lemas
//!
//! Transforma o problema aberto "palavra → lema" em um problema de
//! classificação com vocabulário fechado: em vez de prever o lema, o modelo
//! prevê a **classe de transformação** que leva a palavra ao lema.
//!
//! ## Intuição
//!
//! Milhares de pares distintos colapsam na mesma classe:
//!
//! | Palavra   | Lema    | Classe       |
//! |-----------|---------|--------------|
//! | cats      | cat     | `D0:s`       |
//! | dogs      | dog     | `D0:s`       |
//! | walked    | walk    | `D0:dD1:e`   |
//! | played    | play    | `D0:dD1:e`   |
//! | run       | run     | `=`          |
//!
//! ## Codificação
//!
//! Palavra e lema são convertidos para minúsculas e **invertidos**, de modo
//! que as posições contam a partir do fim da palavra. Calcula-se o script
//! mínimo de inserções e remoções (uma substituição vira remoção + inserção)
//! e cada operação é serializada como:
//!
//! ```text
//! <D|I>[^]<posição>:<caractere>
//! ```
//!
//! - `D` remove o caractere na posição; `I` insere antes dela.
//! - Sem `^`, a posição conta a partir do **fim** da palavra (sufixo e interior).
//! - Com `^`, a posição conta a partir do **início**: usado para as edições
//!   que ficam depois do último caractere mantido (região de prefixo), para
//!   que `gemacht → machen` e `gesagt → sagen` compartilhem a classe.
//! - A transformação identidade é a classe [`IDENTITY`].
//!
//! ## Desempate
//!
//! Entre os scripts de tamanho mínimo, escolhe-se sempre o que edita o mais
//! próximo possível do fim da palavra e, na mesma posição, remove antes de
//! inserir. A escolha é determinística.
//!
//! Tudo opera sobre `char` (codepoints Unicode), nunca sobre bytes.

/// Classe da transformação identidade.
pub const IDENTITY: &str = "=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Delete(char),
    Insert(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Posição contada a partir do fim da palavra.
    End,
    /// Posição contada a partir do início da palavra.
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edit {
    op: Op,
    anchor: Anchor,
    pos: usize,
}

/// Codifica o par `(word, lemma)` como uma classe de transformação.
///
/// # Exemplo
/// ```
/// use morpho_core::ses;
///
/// assert_eq!(ses::encode("cats", "cat"), "D0:s");
/// assert_eq!(ses::decode("dogs", &ses::encode("cats", "cat")), "dog");
/// ```
pub fn encode(word: &str, lemma: &str) -> String {
    let word: Vec<char> = word.to_lowercase().chars().rev().collect();
    let lemma: Vec<char> = lemma.to_lowercase().chars().rev().collect();
    serialize(&shortest_edit_script(&word, &lemma))
}

/// Aplica a classe `class` sobre `word` (em minúsculas) e devolve o lema.
///
/// Quando o script não se aplica à palavra (posição inexistente, caractere
/// a remover diferente do esperado, classe malformada), devolve a string
/// vazia. Isso é esperado para predições ruidosas e não é um erro.
pub fn decode(word: &str, class: &str) -> String {
    let Some(edits) = parse(class) else {
        return String::new();
    };
    let word: Vec<char> = word.to_lowercase().chars().rev().collect();
    let n = word.len();

    let mut out: Vec<char> = Vec::with_capacity(n + 4);
    let mut i = 0;
    for edit in edits {
        let p = match edit.anchor {
            Anchor::End => edit.pos,
            Anchor::Start => match n.checked_sub(edit.pos) {
                Some(p) => p,
                None => return String::new(),
            },
        };
        if p < i || p > n {
            return String::new();
        }
        out.extend_from_slice(&word[i..p]);
        i = p;
        match edit.op {
            Op::Delete(c) => {
                if i >= n || word[i] != c {
                    return String::new();
                }
                i += 1;
            }
            Op::Insert(c) => out.push(c),
        }
    }
    out.extend_from_slice(&word[i..]);
    out.iter().rev().collect()
}

/// Calcula o script mínimo sobre as sequências já invertidas.
///
/// `cost[i][j]` é o número mínimo de edições para transformar `word[i..]`
/// em `lemma[j..]`; o caminho é percorrido de `(0, 0)` preferindo remoção,
/// depois inserção, depois manter.
fn shortest_edit_script(word: &[char], lemma: &[char]) -> Vec<Edit> {
    let (n, m) = (word.len(), lemma.len());
    let mut cost = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..=n).rev() {
        for j in (0..=m).rev() {
            cost[i][j] = if i == n {
                m - j
            } else if j == m {
                n - i
            } else {
                let edit = 1 + cost[i + 1][j].min(cost[i][j + 1]);
                if word[i] == lemma[j] {
                    edit.min(cost[i + 1][j + 1])
                } else {
                    edit
                }
            };
        }
    }

    let mut edits = Vec::with_capacity(cost[0][0]);
    // Número de edições emitidas até o último caractere mantido
    let mut before_last_keep: Option<usize> = None;
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && cost[i][j] == 1 + cost[i + 1][j] {
            edits.push((Op::Delete(word[i]), i));
            i += 1;
        } else if j < m && cost[i][j] == 1 + cost[i][j + 1] {
            edits.push((Op::Insert(lemma[j]), i));
            j += 1;
        } else {
            i += 1;
            j += 1;
            before_last_keep = Some(edits.len());
        }
    }

    let prefix_from = before_last_keep.unwrap_or(edits.len());
    edits
        .into_iter()
        .enumerate()
        .map(|(k, (op, pos))| {
            if k >= prefix_from {
                Edit {
                    op,
                    anchor: Anchor::Start,
                    pos: n - pos,
                }
            } else {
                Edit {
                    op,
                    anchor: Anchor::End,
                    pos,
                }
            }
        })
        .collect()
}

fn serialize(edits: &[Edit]) -> String {
    if edits.is_empty() {
        return IDENTITY.to_string();
    }
    let mut out = String::new();
    for edit in edits {
        let (kind, c) = match edit.op {
            Op::Delete(c) => ('D', c),
            Op::Insert(c) => ('I', c),
        };
        out.push(kind);
        if edit.anchor == Anchor::Start {
            out.push('^');
        }
        out.push_str(&edit.pos.to_string());
        out.push(':');
        out.push(c);
    }
    out
}

fn parse(class: &str) -> Option<Vec<Edit>> {
    if class == IDENTITY {
        return Some(Vec::new());
    }
    if class.is_empty() {
        return None;
    }

    let mut edits = Vec::new();
    let mut chars = class.chars().peekable();
    while let Some(kind) = chars.next() {
        let anchor = if chars.peek() == Some(&'^') {
            chars.next();
            Anchor::Start
        } else {
            Anchor::End
        };

        let mut pos = 0usize;
        let mut digits = 0;
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            pos = pos.checked_mul(10)?.checked_add(d as usize)?;
            digits += 1;
            chars.next();
        }
        if digits == 0 || chars.next() != Some(':') {
            return None;
        }
        let c = chars.next()?;
        let op = match kind {
            'D' => Op::Delete(c),
            'I' => Op::Insert(c),
            _ => return None,
        };
        edits.push(Edit { op, anchor, pos });
    }
    Some(edits)
}
