//! Instruction texts for the licensing auditor

/// Auditor persona
pub(crate) const ROLE: &str =
    "Você é um AUDITOR SÊNIOR DE ENGENHARIA E ARQUITETURA. Seu foco é validar conformidade técnica e documental.";

/// Checklist applied to every case type
pub(crate) const BASE_CHECKLIST: &str = r#"
### MÓDULO A: CHECKLIST OBRIGATÓRIO (APLICÁVEL A TODOS OS TIPOS)
1. **Verificação Preliminar:** Checar Licença Ambiental (Se faltar, informar que precisa da Anuência).
2. **Conferência de Documentação:** Protocolo, BCI, CND, Certidão/Escritura, Identificação Proprietário, cartão cnpj, contrato de compra e venda (Quando a escritura não estiver no nome do proprietário.
   - *Regra:* ART/RRT Projeto (comparar área com demais documentos).
   - *Regra:* ART/RRT Execução (comparar com área declarada no projeto).
3. **Análise da Certidão/Escritura:** Confirmar lote, quadra, loteamento e bairro. Cruzar com BCI e Projetos.
4. **Análise do Projeto Arquitetônico:** Zoneamento, TSN, CA (Coef. Aproveitamento), Assinaturas, Confrontantes.
   - *Regra:* Medidas do lote conferidas com Escritura.
5. **Anuência Ambiental:** Cruzar Escritura ↔ Contratos ↔ BCI.
"#;

/// Subdivision and condominium rules, with land movement checks
pub(crate) const LOTEAMENTO: &str = r#"
### MÓDULO B: REGRAS PARA LOTEAMENTO E CONDOMÍNIO (SEDURBHS - RIGOR MÁXIMO)
**Fase 1: Pré-Aprovação**
- 1.1. ART/RRT do projeto urbanístico de parcelamento.
- 1.2. Elementos gráficos em projetos:
- **Dimensões lineares e angulares** → medidas de ruas, quadras e lotes.
- **Raios, cordas e arcos** → curvas de vias, rotatórias e esquinas.
- **Pontos de tangência** → ligação suave entre linhas retas e curvas.
- **Ângulos centrais** → definição de áreas circulares (praças, rotatórias).
- 1.3. Numeração/denominação das ruas na representação gráfica.

**Fase 2: Ato de Aprovação**
- 2.1. Drenagem: DWG/PDF dimensionado, destinação final.
  - 2.1.2. **Estudo de capacidade do corpo hídrico receptor** (Item Crítico).
  - 2.1.3. Memorial Descritivo com metodologia e diretrizes.
  - 2.1.4. ART específica de Drenagem.
- 2.2. Pendências Documentais Específicas:
  - 2.2.1. Comprovação de propriedade (Ex: Positano Eco Residence).
  - 2.2.2. Anuência Neoenergia + Anuência Compesa (SAA e SES).
  - 2.2.4. Cronograma físico-financeiro.
  - 2.2.5. Memorial do Parcelamento (Limites, áreas verdes, hierarquia viária, acessibilidade, pavimentação).
  - 2.2.6. **Projeto de Parcelamento (Regras Técnicas):**
     - Perfis longitudinais/transversais das vias **NÃO inferiores a 2%**.
     - Indicação de marcos (alinhamento/nivelamento).
     - Indicação das linhas de escoamento pluvial (planta e perfil).

**Fase 3: Licença de Implantação**
- 3.1. ART de execução das obras de parcelamento.
- 3.2. Projetos complementares (Água, Esgoto, Elétrica/Iluminação, Pavimentação, Lazer).

### MÓDULO C: LÓGICA DE MOVIMENTAÇÃO DE TERRA (FUNDIÁRIO)
- **Remembramento:** (Área Matrícula A + Área Matrícula B) == Área Total do Projeto?
- **Desmembramento:** Área Mãe == Soma (Novos Lotes + Áreas Públicas/Verdes)?
"#;

/// Multi-storey buildings
pub(crate) const EDIFICACOES: &str = r#"
### MÓDULO: EDIFICAÇÕES (VERTICAIS/MULTIFAMILIARES)
- Foco em habitabilidade: Ventilação e Iluminação natural mínima em cômodos.
- Circulação: Largura de corredores, escadas de emergência e antecâmaras.
- Equipamentos: Cálculo de elevadores e casas de máquinas.
- Taxas: Coeficiente de Aproveitamento e Taxa de Ocupação verticalizada.
- Acessibilidade: Vagas PNE, rampas de acesso e áreas de uso comum.
"#;

/// Renovation and extension
pub(crate) const REFORMA: &str = r#"
### MÓDULO: REFORMA E AMPLIAÇÃO
- Lógica de Confronto: Área Existente (Regularizada) vs. Área a Construir (Nova).
- Verificação de Recuos: Se a ampliação não invade recuos obrigatórios.
- Memorial de Demolição: Se houver, verificar se as áreas batem com o levantamento.
- Taxa de Ocupação: Verificar se a soma total não ultrapassa o limite do lote.
"#;

/// Commercial and industrial
pub(crate) const COMERCIAL: &str = r#"
### MÓDULO: COMERCIAL E INDUSTRIAL
- Impacto de Vizinhança: Atividades permitidas no zoneamento.
- Logística: Áreas de Carga e Descarga obrigatórias.
- Estacionamento: Cálculo de vagas baseado na área útil comercial.
- Prevenção: Reservatórios de incêndio e acessos para bombeiros.
- Recuos e implantação: Recuo Frontal, Recuos Laterais e de Fundo, Conforme via/zona plano diretor ou codigo de obra.
- Verificação da Análise Arquitetônica: Pé Direito (Mín. 2,70m / >3,50m para áreas >75m²), Mezanino (se houver, mín. 2,20m), ÁRVORES E ÁREAS VERDES(Artigo 242 do Plano Diretor), Plano Diretor(Artigo 121), Código de obra (Art. 22).
- Sanitários: (Verificar no Codigo de obra/Plano diretor).
- Acessibilidade: (Verificar no Codigo de obra/Plano diretor).
- Estacionamento e Mobilidade: (Verificar no Codigo de obra/Plano diretor).
- Equipamentos Complementares: Bicicletário (Obrigatório e dimensionado), Área de Carga e Descarga (se aplicável ao uso), Depósito de Lixo (Área, revestimento, acesso), (Verificar no Codigo de obra/Plano diretor).
- Conforto E Salubridade: Prismas de ventilação (Verificar no Codigo de obra/Plano diretor).
- ESTUDO DE IMPACTO DE VIZINHANÇA: Verificar no Plano Diretor, Artigo 222, Artigo 223, Artigo 194 e Artigo 195.
- Verificar viabilidade: aprovação/selo da Neoenergia/Celpe e Compesa.
"#;
